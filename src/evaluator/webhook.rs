use std::{collections::HashMap, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderName, InvalidHeaderValue};
use serde_json::{Value, json};

use crate::{
    Result, RuleflowError,
    evaluator::interpolate,
    model::{AuthorizationType, WebhookConfig},
    runtime::Context,
};

fn header_name(name: &str) -> Result<HeaderName> {
    name.parse().map_err(|err: InvalidHeaderName| RuleflowError::Action(err.to_string()))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    value.parse().map_err(|err: InvalidHeaderValue| RuleflowError::Action(err.to_string()))
}

fn apply_auth_headers(
    config: &WebhookConfig,
    headers: &mut HeaderMap,
) -> Result<()> {
    if config.auth.auth_type == AuthorizationType::NoAuth {
        return Ok(());
    }

    let api_key = config.auth.api_key.as_ref().ok_or_else(|| RuleflowError::Action("api_key is required for webhook authorization".to_string()))?;
    let header = header_name(config.auth.header.as_deref().unwrap_or("Authorization"))?;

    let value = match config.auth.auth_type {
        AuthorizationType::Bearer => format!("Bearer {}", api_key),
        // `user:password` is encoded, anything else is taken as already encoded
        AuthorizationType::Basic if api_key.contains(':') => format!("Basic {}", STANDARD.encode(api_key.as_bytes())),
        AuthorizationType::Basic => format!("Basic {}", api_key),
        AuthorizationType::Custom | AuthorizationType::NoAuth => api_key.clone(),
    };
    headers.insert(header, header_value(&value)?);

    Ok(())
}

pub(crate) fn build_request(
    client: &reqwest::Client,
    ctx: &Context,
    config: &WebhookConfig,
) -> Result<reqwest::RequestBuilder> {
    let url = interpolate::resolve_template(ctx, &config.url)?;

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));
    apply_auth_headers(config, &mut headers)?;
    for (key, value) in &config.headers {
        headers.insert(header_name(key)?, header_value(&interpolate::resolve_template(ctx, value)?)?);
    }

    let mut query = Vec::new();
    for (key, value) in &config.params {
        query.push((key.clone(), interpolate::resolve_template(ctx, value)?));
    }

    let method = config.method.as_ref().parse::<reqwest::Method>().map_err(|err| RuleflowError::Action(err.to_string()))?;
    let mut request = client.request(method, &url).headers(headers).query(&query);

    if let Some(body) = &config.body {
        request = request.json(&interpolate::resolve_json_value(ctx, body)?);
    }

    Ok(request.timeout(Duration::from_millis(config.timeout)))
}

/// Send the webhook and capture the response.
///
/// Transport failures and non-2xx responses are errors; the output carries
/// `status_code`, `headers` and the raw `body`.
pub(crate) async fn call(
    client: &reqwest::Client,
    ctx: &Context,
    config: &WebhookConfig,
) -> Result<Value> {
    let res = build_request(client, ctx, config)?.send().await.map_err(|err| RuleflowError::Action(format!("webhook error: {}", err)))?;

    let status = res.status();
    let headers: HashMap<String, String> = res.headers().iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string())).collect();
    let body = res.text().await.map_err(|err| RuleflowError::Action(err.to_string()))?;

    if !status.is_success() {
        return Err(RuleflowError::Action(format!("webhook responded with {}", status.as_u16())));
    }

    Ok(json!({
        "status_code": status.as_u16(),
        "headers": headers,
        "body": body,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        model::{AuthorizationConfig, HttpMethod, TriggerSource},
        runtime::Channel,
    };

    fn context() -> Context {
        let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());
        let channel = Arc::new(Channel::new(runtime.handle().clone()));
        let env = HashMap::from([("TOKEN".to_string(), "s3cret".to_string())]);
        Context::new("r1", "e1", TriggerSource::device_event("boiler-1", json!({ "temperature": 850 })), &env, channel)
    }

    fn config() -> WebhookConfig {
        WebhookConfig {
            url: "http://localhost:8080/alerts/{{@temperature@}}".to_string(),
            method: HttpMethod::POST,
            headers: HashMap::from([("x-token".to_string(), "{{$TOKEN$}}".to_string())]),
            params: HashMap::from([("site".to_string(), "north".to_string())]),
            auth: AuthorizationConfig::default(),
            body: Some(json!({ "temperature": "{{@temperature@}}" })),
            timeout: 500,
        }
    }

    #[test]
    fn test_build_request() {
        let ctx = context();
        let request = build_request(&reqwest::Client::new(), &ctx, &config()).unwrap().build().unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "http://localhost:8080/alerts/850?site=north");
        assert_eq!(request.headers()["x-token"], "s3cret");
        assert_eq!(request.timeout(), Some(&Duration::from_millis(500)));

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(serde_json::from_slice::<Value>(body).unwrap(), json!({ "temperature": 850 }));
    }

    #[test]
    fn test_auth_headers() {
        let mut cfg = config();
        cfg.auth = AuthorizationConfig {
            auth_type: AuthorizationType::Basic,
            api_key: Some("user:pass".to_string()),
            header: None,
        };
        let mut headers = HeaderMap::new();
        apply_auth_headers(&cfg, &mut headers).unwrap();
        assert_eq!(headers["authorization"], "Basic dXNlcjpwYXNz");

        cfg.auth = AuthorizationConfig {
            auth_type: AuthorizationType::Bearer,
            api_key: Some("abc".to_string()),
            header: Some("x-auth".to_string()),
        };
        let mut headers = HeaderMap::new();
        apply_auth_headers(&cfg, &mut headers).unwrap();
        assert_eq!(headers["x-auth"], "Bearer abc");

        cfg.auth.api_key = None;
        assert!(apply_auth_headers(&cfg, &mut HeaderMap::new()).is_err());
    }

    #[test]
    fn test_unresolved_url() {
        let mut cfg = config();
        cfg.url = "http://localhost/{{@missing@}}".to_string();
        assert!(build_request(&reqwest::Client::new(), &context(), &cfg).is_err());
    }
}
