//! Host ops exposed to extension scripts
//!
//! Scripts run in a bare deno_core isolate. Anything beyond plain ECMAScript
//! (network, HTML parsing, url resolution, logging, extractors and native
//! services) goes through the ops declared here. The prelude in
//! `js/prelude.js` wraps them into the axios/cheerio-style surface providers
//! expect.

use deno_core::error::AnyError;
use deno_core::{op2, Extension, JsRuntime, Op, OpState, RuntimeOptions};
use serde::Serialize;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::context::{self, ContextKind, ProviderContext};
use super::enums::StreamingServer;
use super::html::{self, HtmlNode};
use super::http::{HttpRequest, HttpResponse};
use super::models::EpisodeSources;
use crate::core::error::{ReelError, Result};

const PRELUDE: &str = include_str!("js/prelude.js");

/// Per-isolate state reachable from every op
#[derive(Clone)]
pub(crate) struct HostState {
    pub extension_id: String,
    pub kind: ContextKind,
    pub context: ProviderContext,
}

fn host(state: &Rc<RefCell<OpState>>) -> HostState {
    state.borrow().borrow::<HostState>().clone()
}

#[op2(async)]
#[serde]
pub async fn op_http_request(
    state: Rc<RefCell<OpState>>,
    #[serde] request: HttpRequest,
) -> std::result::Result<HttpResponse, AnyError> {
    let host = host(&state);
    trace!(extension = %host.extension_id, url = %request.url, "Script HTTP request");
    Ok(host.context.http.execute(request).await?)
}

#[op2]
#[serde]
pub fn op_html_select(
    #[string] markup: String,
    #[string] selector: String,
    within: bool,
) -> std::result::Result<Vec<HtmlNode>, AnyError> {
    let nodes = if within {
        html::select_within(&markup, &selector)?
    } else {
        html::select(&markup, &selector)?
    };
    Ok(nodes)
}

#[op2(fast)]
pub fn op_html_matches(
    #[string] outer_html: String,
    #[string] selector: String,
) -> std::result::Result<bool, AnyError> {
    Ok(html::matches(&outer_html, &selector)?)
}

/// Url components as the script-side `URL` class stores them
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlParts {
    pub href: String,
    pub protocol: String,
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub port: String,
    pub pathname: String,
    pub search: String,
    pub hash: String,
    /// Urls such as `data:` or `mailto:` that have no authority
    pub opaque: bool,
}

pub fn parse_url(input: &str, base: Option<&str>) -> Result<UrlParts> {
    let invalid = |e: url::ParseError| ReelError::Runtime(format!("Invalid URL '{}': {}", input, e));
    let url = match base {
        Some(base) => Url::parse(base).map_err(invalid)?.join(input).map_err(invalid)?,
        None => Url::parse(input).map_err(invalid)?,
    };

    Ok(UrlParts {
        href: url.to_string(),
        protocol: format!("{}:", url.scheme()),
        username: url.username().to_string(),
        password: url.password().unwrap_or_default().to_string(),
        hostname: url.host_str().unwrap_or_default().to_string(),
        port: url.port().map(|p| p.to_string()).unwrap_or_default(),
        pathname: url.path().to_string(),
        search: url.query().map(|q| format!("?{}", q)).unwrap_or_default(),
        hash: url.fragment().map(|f| format!("#{}", f)).unwrap_or_default(),
        opaque: url.cannot_be_a_base(),
    })
}

#[op2]
#[serde]
pub fn op_url_parse(
    #[string] input: String,
    #[string] base: Option<String>,
) -> std::result::Result<UrlParts, AnyError> {
    Ok(parse_url(&input, base.as_deref())?)
}

#[op2]
#[string]
pub fn op_custom_base_url(#[string] default_url: String, #[string] custom_url: Option<String>) -> String {
    context::create_custom_base_url(&default_url, custom_url.as_deref())
}

#[op2(fast)]
pub fn op_log(state: &mut OpState, #[string] level: String, #[string] message: String) {
    let extension = state.borrow::<HostState>().extension_id.clone();
    match level.as_str() {
        "error" => error!(extension = %extension, "{}", message),
        "warn" => warn!(extension = %extension, "{}", message),
        "debug" => debug!(extension = %extension, "{}", message),
        "trace" => trace!(extension = %extension, "{}", message),
        _ => info!(extension = %extension, "{}", message),
    }
}

#[op2(async)]
#[serde]
pub async fn op_extract(
    state: Rc<RefCell<OpState>>,
    #[string] server: String,
    #[string] url: String,
) -> std::result::Result<EpisodeSources, AnyError> {
    let host = host(&state);
    let server = StreamingServer::parse(&server)
        .ok_or_else(|| ReelError::NotFound(format!("unknown streaming server: {}", server)))?;
    debug!(extension = %host.extension_id, server = %server, url = %url, "Routing to extractor");
    let extractor = host.context.extractor(server)?;
    Ok(extractor.extract(&url).await?)
}

#[op2(async)]
#[serde]
pub async fn op_native_cookies(
    state: Rc<RefCell<OpState>>,
    #[string] url: String,
) -> std::result::Result<HashMap<String, String>, AnyError> {
    let host = host(&state);
    Ok(host.context.native.cookie_bypass(&url).await?)
}

#[op2(async)]
#[string]
pub async fn op_native_headless(
    state: Rc<RefCell<OpState>>,
    #[string] url: String,
) -> std::result::Result<String, AnyError> {
    let host = host(&state);
    Ok(host.context.native.headless_fetch(&url).await?)
}

#[op2]
#[string]
pub fn op_native_deobfuscate(
    state: &mut OpState,
    #[string] script: String,
) -> std::result::Result<String, AnyError> {
    let native = state.borrow::<HostState>().context.native.clone();
    Ok(native.deobfuscate(&script)?)
}

/// Create an isolate with the host ops installed and the prelude booted
pub(crate) fn create_runtime(host: HostState) -> Result<JsRuntime> {
    let ext = Extension {
        name: "reelhub_host",
        ops: Cow::Borrowed(&[
            op_http_request::DECL,
            op_html_select::DECL,
            op_html_matches::DECL,
            op_url_parse::DECL,
            op_custom_base_url::DECL,
            op_log::DECL,
            op_extract::DECL,
            op_native_cookies::DECL,
            op_native_headless::DECL,
            op_native_deobfuscate::DECL,
        ]),
        ..Default::default()
    };

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![ext],
        ..Default::default()
    });

    let descriptor = host.context.script_descriptor(&host.extension_id, host.kind);
    runtime.op_state().borrow_mut().put(host);

    runtime
        .execute_script("<reelhub_prelude>", PRELUDE.to_string().into())
        .map_err(|e| ReelError::Runtime(format!("prelude failed: {}", e)))?;

    let boot = format!("globalThis.__reelhub.boot({});", descriptor);
    runtime
        .execute_script("<reelhub_boot>", boot.into())
        .map_err(|e| ReelError::Runtime(format!("context boot failed: {}", e)))?;

    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_url() {
        let parts = parse_url("/watch/1?ep=2#t", Some("https://site.example/home/")).unwrap();
        assert_eq!(parts.href, "https://site.example/watch/1?ep=2#t");
        assert_eq!(parts.protocol, "https:");
        assert_eq!(parts.hostname, "site.example");
        assert_eq!(parts.pathname, "/watch/1");
        assert_eq!(parts.search, "?ep=2");
        assert_eq!(parts.hash, "#t");
        assert!(!parts.opaque);
    }

    #[test]
    fn test_parse_url_with_port_and_opaque() {
        let parts = parse_url("http://127.0.0.1:8080/a", None).unwrap();
        assert_eq!(parts.port, "8080");

        assert!(parse_url("data:text/plain,hello", None).unwrap().opaque);
        assert!(matches!(parse_url("not a url", None), Err(ReelError::Runtime(_))));
    }
}
