pub mod json;
pub mod time;

/// Alphabet used for generated ids, lower-case only so ids are URL and log friendly.
const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z',
];

/// Generate a 21 character id, used for executions and ledger records.
pub fn longid() -> String {
    nanoid::nanoid!(21, &ID_ALPHABET)
}

/// Generate a UUID v4 string, used for rule ids.
pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longid_length_and_alphabet() {
        let id = longid();
        assert_eq!(id.len(), 21);
        assert!(id.chars().all(|c| ID_ALPHABET.contains(&c)));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(longid(), longid());
        assert_ne!(uuid(), uuid());
    }
}
