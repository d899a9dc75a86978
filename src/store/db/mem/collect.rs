use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde_json::Value as JsonValue;
use tracing::trace;

use crate::{
    Result, RuleflowError, ShareLock,
    store::{DbCollection, PageData, db::mem::DbDocument, query::Query},
};

fn lock_err(name: &str) -> RuleflowError {
    RuleflowError::Store(format!("collection '{}' lock poisoned", name))
}

fn compare(
    a: Option<&JsonValue>,
    b: Option<&JsonValue>,
) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(a)), Some(JsonValue::Number(b))) => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(a)), Some(JsonValue::String(b))) => a.cmp(b),
        (Some(JsonValue::Bool(a)), Some(JsonValue::Bool(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[derive(Debug, Clone)]
pub struct Collect<T> {
    name: String,
    items: ShareLock<HashMap<String, T>>,
}

impl<T> Collect<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let items = self.items.read().map_err(|_| lock_err(&self.name))?;
        Ok(items.contains_key(id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        let items = self.items.read().map_err(|_| lock_err(&self.name))?;
        items.get(id).cloned().ok_or_else(|| RuleflowError::Store(format!("fail to find {} '{}'", self.name, id)))
    }

    fn query(
        &self,
        q: &Query,
    ) -> Result<PageData<Self::Item>> {
        trace!("{}::query({:?})", self.name, q);
        let items = self.items.read().map_err(|_| lock_err(&self.name))?;

        let mut matched = Vec::new();
        for item in items.values() {
            let doc = item.doc()?;
            if q.is_match(&doc) {
                matched.push((doc, item));
            }
        }

        matched.sort_by(|(a, _), (b, _)| {
            q.order_by().iter().fold(Ordering::Equal, |ord, (key, rev)| {
                ord.then_with(|| {
                    let ord = compare(a.get(key), b.get(key));
                    if *rev { ord.reverse() } else { ord }
                })
            })
        });

        let count = matched.len();
        let rows = matched.into_iter().skip(q.offset()).take(q.limit()).map(|(_, item)| item.clone()).collect();

        Ok(PageData {
            count,
            page_num: q.offset() / q.limit() + 1,
            page_count: count.div_ceil(q.limit()),
            page_size: q.limit(),
            rows,
        })
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::create({})", self.name, data.id());
        let mut items = self.items.write().map_err(|_| lock_err(&self.name))?;
        if items.contains_key(data.id()) {
            return Ok(false);
        }
        items.insert(data.id().to_string(), data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::update({})", self.name, data.id());
        let mut items = self.items.write().map_err(|_| lock_err(&self.name))?;
        match items.get_mut(data.id()) {
            Some(item) => {
                *item = data.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        trace!("{}::delete({})", self.name, id);
        let mut items = self.items.write().map_err(|_| lock_err(&self.name))?;
        Ok(items.remove(id).is_some())
    }

    fn transact(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut Self::Item) -> Result<()>,
    ) -> Result<Self::Item> {
        let mut items = self.items.write().map_err(|_| lock_err(&self.name))?;
        let item = items.get_mut(id).ok_or_else(|| RuleflowError::Store(format!("fail to find {} '{}'", self.name, id)))?;

        let mut next = item.clone();
        f(&mut next)?;
        *item = next.clone();
        Ok(next)
    }
}
