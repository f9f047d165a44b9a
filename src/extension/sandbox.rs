//! Script sandbox
//!
//! Owns one deno_core isolate. Extension source is wrapped in a function that
//! only sees a synthetic CommonJS scope (`exports`, `require`, `module`,
//! `console`, `Promise`, `Object`, `fetch`); the factory is then resolved by
//! name, called with the booted context, and the resulting instance is kept
//! inside the isolate for later calls.

use deno_core::{v8, JsRuntime};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::context::{ContextKind, ProviderContext};
use super::js_bindings::{create_runtime, HostState};
use super::types::InstanceSurface;
use crate::core::error::{ReelError, Result};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

/// Whether a factory name can be referenced as a bare identifier
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Wrap extension source so it evaluates against the synthetic scope
///
/// The outer function's only parameter is the scope object. The factory is
/// looked up as a declared identifier first, then on `module.exports`, then
/// on the original `exports` object.
fn wrap_source(source: &str, factory_name: &str) -> String {
    format!(
        r#"globalThis.__reelhub.factory = (function (__scope) {{
  return (function (exports, require, module, console, Promise, Object, fetch) {{
{source}
;
    if (typeof {name} !== "undefined") return {name};
    const viaModule = module.exports == null ? undefined : module.exports["{name}"];
    return viaModule !== undefined ? viaModule : exports["{name}"];
  }}).call(__scope.exports, __scope.exports, __scope.require, __scope.module, __scope.console, __scope.Promise, __scope.Object, __scope.fetch);
}})(globalThis.__reelhub.scope());
typeof globalThis.__reelhub.factory === "function";"#,
        source = source,
        name = factory_name,
    )
}

/// One isolate hosting one extension
pub struct ScriptSandbox {
    runtime: JsRuntime,
    extension_id: String,
}

impl ScriptSandbox {
    /// Create an isolate booted with the given context
    pub(crate) fn new(extension_id: &str, kind: ContextKind, context: ProviderContext) -> Result<Self> {
        debug!(extension = %extension_id, kind = kind.as_str(), "Creating script sandbox");
        let runtime = create_runtime(HostState {
            extension_id: extension_id.to_string(),
            kind,
            context,
        })?;
        Ok(Self {
            runtime,
            extension_id: extension_id.to_string(),
        })
    }

    /// Evaluate source and resolve its factory
    pub fn evaluate(&mut self, source: &str, factory_name: &str) -> Result<()> {
        if !is_identifier(factory_name) {
            return Err(ReelError::FactoryMissing(format!(
                "'{}' is not a valid factory name",
                factory_name
            )));
        }

        let wrapped = wrap_source(source, factory_name);
        let result = self
            .runtime
            .execute_script("<extension_source>", wrapped.into())
            .map_err(|e| ReelError::Eval(format!("{}: {}", self.extension_id, e)))?;

        let found = {
            let scope = &mut self.runtime.handle_scope();
            let value = v8::Local::new(scope, &result);
            value.is_true()
        };

        if !found {
            return Err(ReelError::FactoryMissing(format!(
                "{} in {}",
                factory_name, self.extension_id
            )));
        }

        debug!(extension = %self.extension_id, factory = %factory_name, "Factory resolved");
        Ok(())
    }

    /// Call the factory with the context and describe the instance
    pub fn instantiate(&mut self) -> Result<InstanceSurface> {
        let result = self
            .runtime
            .execute_script("<extension_instantiate>", "globalThis.__reelhub.instantiate()".to_string().into())
            .map_err(|e| ReelError::Eval(format!("factory of {} threw: {}", self.extension_id, e)))?;

        let json = {
            let scope = &mut self.runtime.handle_scope();
            let value = v8::Local::new(scope, &result);
            value
                .to_string(scope)
                .map(|s| s.to_rust_string_lossy(scope))
                .ok_or_else(|| ReelError::Runtime("instance surface is not a string".to_string()))?
        };

        let surface: InstanceSurface = serde_json::from_str(&json)?;
        debug!(
            extension = %self.extension_id,
            methods = surface.methods.len(),
            "Instance created"
        );
        Ok(surface)
    }

    /// Invoke a method on the instance and wait for its promise to settle
    pub async fn call(&mut self, method: &str, args: &[Value]) -> Result<Value> {
        debug!(extension = %self.extension_id, method = %method, "Calling extension method");

        let args_json = serde_json::to_string(args)?;

        {
            let scope = &mut self.runtime.handle_scope();
            let context = scope.get_current_context();
            let global = context.global(scope);

            let invoke_name = v8::String::new(scope, "__reelhub_invoke")
                .ok_or_else(|| ReelError::Runtime("failed to allocate string".to_string()))?;
            let invoke_val = global
                .get(scope, invoke_name.into())
                .ok_or_else(|| ReelError::Runtime("__reelhub_invoke not found".to_string()))?;
            let invoke_func = v8::Local::<v8::Function>::try_from(invoke_val)
                .map_err(|_| ReelError::Runtime("__reelhub_invoke is not a function".to_string()))?;

            let method_v8 = v8::String::new(scope, method)
                .ok_or_else(|| ReelError::Runtime("failed to allocate string".to_string()))?;
            let args_v8 = v8::String::new(scope, &args_json)
                .ok_or_else(|| ReelError::Runtime("failed to allocate string".to_string()))?;
            let args_val = v8::json::parse(scope, args_v8)
                .ok_or_else(|| ReelError::Runtime("failed to parse arguments in V8".to_string()))?;

            let recv = v8::undefined(scope).into();
            if invoke_func
                .call(scope, recv, &[method_v8.into(), args_val])
                .is_none()
            {
                return Err(ReelError::Runtime(format!("failed to invoke {}", method)));
            }
        }

        self.runtime
            .run_event_loop(Default::default())
            .await
            .map_err(|e| ReelError::Runtime(format!("event loop failed: {}", e)))?;

        let (status, payload) = {
            let scope = &mut self.runtime.handle_scope();
            let context = scope.get_current_context();
            let global = context.global(scope);

            let get_global_string = |scope: &mut v8::HandleScope, key: &str| -> Option<String> {
                let key = v8::String::new(scope, key)?;
                let val = global.get(scope, key.into())?;
                if val.is_undefined() || val.is_null() {
                    return None;
                }
                Some(val.to_string(scope)?.to_rust_string_lossy(scope))
            };

            let status = get_global_string(scope, "__reelhub_status").unwrap_or_default();
            let payload = match status.as_str() {
                "success" => get_global_string(scope, "__reelhub_result"),
                _ => get_global_string(scope, "__reelhub_error"),
            };
            (status, payload)
        };

        let _ = self.runtime.execute_script(
            "<cleanup>",
            r#"
            globalThis.__reelhub_result = undefined;
            globalThis.__reelhub_error = undefined;
            globalThis.__reelhub_status = undefined;
            "#
            .to_string()
            .into(),
        );

        match status.as_str() {
            "success" => {
                let json = payload.unwrap_or_else(|| "null".to_string());
                Ok(serde_json::from_str(&json)?)
            }
            "error" => Err(ReelError::Runtime(format!(
                "{}.{} failed: {}",
                self.extension_id,
                method,
                payload.unwrap_or_else(|| "unknown error".to_string())
            ))),
            "pending" => Err(ReelError::Runtime(format!(
                "{}.{} never settled",
                self.extension_id, method
            ))),
            other => Err(ReelError::Runtime(format!("invalid execution status: {}", other))),
        }
    }

    /// Ask V8 to reclaim memory
    pub fn garbage_collect(&mut self) {
        self.runtime.v8_isolate().low_memory_notification();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::extension::context::NoNativeBridge;
    use crate::extension::extractor::tests::echo_factory;
    use crate::extension::enums::StreamingServer;
    use crate::extension::extractor::ExtractorRegistry;
    use crate::extension::http::HttpClient;
    use crate::extension::testing;
    use serde_json::json;
    use std::sync::Arc;

    fn sandbox(kind: ContextKind) -> ScriptSandbox {
        let http = HttpClient::new(&Config::default().http).unwrap();
        let mut extractors = ExtractorRegistry::new();
        extractors.register(StreamingServer::VidCloud, echo_factory());
        let context = ProviderContext::new(http, extractors, Arc::new(NoNativeBridge));
        ScriptSandbox::new("test-ext", kind, context).unwrap()
    }

    fn loaded(source: &str, factory: &str) -> ScriptSandbox {
        let mut sandbox = sandbox(ContextKind::Provider);
        sandbox.evaluate(source, factory).unwrap();
        sandbox.instantiate().unwrap();
        sandbox
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("createDemo"));
        assert!(is_identifier("$factory_2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("x; globalThis.pwned = 1"));
    }

    #[tokio::test]
    async fn test_declared_factory() {
        let mut sandbox = sandbox(ContextKind::Provider);
        sandbox
            .evaluate(
                "function createDemo(ctx) { return { name: 'Demo', search: async (q) => ({ results: [{ id: q }] }) }; }",
                "createDemo",
            )
            .unwrap();
        let surface = sandbox.instantiate().unwrap();
        assert_eq!(surface.name.as_deref(), Some("Demo"));
        assert!(surface.has_method("search"));

        let value = sandbox.call("search", &[json!("frieren")]).await.unwrap();
        assert_eq!(value["results"][0]["id"], "frieren");
    }

    #[tokio::test]
    async fn test_exports_factory_and_inherited_methods() {
        let mut sandbox = loaded(
            r#"
            class Base { async search() { return { results: [] }; } }
            class Site extends Base {
              constructor(ctx) { super(); this.baseUrl = "https://site.example"; }
              async fetchEpisodeServers() { return []; }
            }
            exports.createSite = (ctx) => new Site(ctx);
            "#,
            "createSite",
        );
        let value = sandbox.call("fetchEpisodeServers", &[json!("ep-1")]).await.unwrap();
        assert_eq!(value, json!([]));

        let mut fresh = sandbox_with(
            r#"module.exports = { createSite: () => new (class { async search() { return {}; } })() };"#,
            "createSite",
        );
        assert!(fresh.instantiate().unwrap().has_method("search"));
    }

    fn sandbox_with(source: &str, factory: &str) -> ScriptSandbox {
        let mut sandbox = sandbox(ContextKind::Provider);
        sandbox.evaluate(source, factory).unwrap();
        sandbox
    }

    #[tokio::test]
    async fn test_surface_walks_prototype_chain() {
        let mut sandbox = sandbox_with(
            r#"
            class Base { async search() {} }
            class Site extends Base { async fetchEpisodeSources() {} }
            function createSite() { return new Site(); }
            "#,
            "createSite",
        );
        let surface = sandbox.instantiate().unwrap();
        assert!(surface.has_method("search"));
        assert!(surface.has_method("fetchEpisodeSources"));
        assert!(!surface.has_method("constructor"));
    }

    #[test]
    fn test_missing_factory() {
        let mut sandbox = sandbox(ContextKind::Provider);
        let err = sandbox.evaluate("const unrelated = 1;", "createDemo").unwrap_err();
        assert!(matches!(err, ReelError::FactoryMissing(_)));
        assert!(err.to_string().contains("createDemo"));

        let mut sandbox = self::sandbox(ContextKind::Provider);
        assert!(matches!(
            sandbox.evaluate("const createDemo = 42;", "createDemo"),
            Err(ReelError::FactoryMissing(_))
        ));
    }

    #[test]
    fn test_syntax_and_top_level_errors() {
        let mut sandbox = sandbox(ContextKind::Provider);
        assert!(matches!(
            sandbox.evaluate("function createDemo( {", "createDemo"),
            Err(ReelError::Eval(_))
        ));

        let mut sandbox = self::sandbox(ContextKind::Provider);
        let err = sandbox
            .evaluate("throw new Error('boom at load');", "createDemo")
            .unwrap_err();
        assert!(matches!(err, ReelError::Eval(_)));
        assert!(err.to_string().contains("boom at load"));
    }

    #[test]
    fn test_factory_throwing_is_eval_error() {
        let mut sandbox = sandbox_with(
            "function createDemo(ctx) { throw new Error('no ctx for you'); }",
            "createDemo",
        );
        let err = sandbox.instantiate().unwrap_err();
        assert!(matches!(err, ReelError::Eval(_)));
        assert!(err.to_string().contains("no ctx for you"));
    }

    #[tokio::test]
    async fn test_require_allow_list() {
        let mut sandbox = loaded(
            r#"
            const axios = require("axios");
            const cheerio = require("cheerio");
            const { createProviderContext } = require("../utils/create-provider-context");
            const unknown = require("fs");
            function createDemo(ctx) {
              return {
                probe: async () => ({
                  sameAxios: axios === ctx.axios,
                  cheerioLoad: cheerio.load === ctx.load,
                  sameContext: createProviderContext() === ctx,
                  unknownKeys: Object.keys(unknown).length,
                  hasAnimeParser: typeof ctx.AnimeParser === "function",
                  vidcloud: ctx.StreamingServers.VidCloud,
                  enumsMirror: ctx.enums.TvType.MOVIE === ctx.TvType.MOVIE,
                  extractor: typeof ctx.extractors.VidCloud,
                }),
              };
            }
            "#,
            "createDemo",
        );
        let probe = sandbox.call("probe", &[]).await.unwrap();
        assert_eq!(
            probe,
            json!({
                "sameAxios": true,
                "cheerioLoad": true,
                "sameContext": true,
                "unknownKeys": 0,
                "hasAnimeParser": true,
                "vidcloud": "vidcloud",
                "enumsMirror": true,
                "extractor": "function",
            })
        );
    }

    #[tokio::test]
    async fn test_html_queries() {
        let mut sandbox = loaded(
            r#"
            function createDemo(ctx) {
              return {
                parse: async (markup) => {
                  const $ = ctx.load(markup);
                  return {
                    count: $(".item").length,
                    titles: $(".item").map((i, el) => $(el).find("a").text()).get(),
                    firstHref: $(".item a").first().attr("href"),
                    lastId: $(".item").last().attr("data-id"),
                    second: $(".item").eq(1).find("a").attr("title"),
                    missing: $(".nope").attr("href") === undefined,
                    active: $(".item").filter(".active").length,
                    cells: $("tr").map((i, tr) => $(tr).find("td").length).get(),
                    rowText: $("table tr").first().find("td").last().text(),
                    rows: $("tr").filter(".row").length,
                  };
                },
              };
            }
            "#,
            "createDemo",
        );
        let markup = r#"<div class="item" data-id="1"><a href="/a" title="A">Alpha</a></div>
                        <div class="item active" data-id="2"><a href="/b" title="B">Beta</a></div>
                        <table><tr class="row"><td>1</td><td>Pilot</td></tr><tr><td>2</td></tr></table>"#;
        let result = sandbox.call("parse", &[json!(markup)]).await.unwrap();
        assert_eq!(result["count"], 2);
        assert_eq!(result["titles"], json!(["Alpha", "Beta"]));
        assert_eq!(result["firstHref"], "/a");
        assert_eq!(result["lastId"], "2");
        assert_eq!(result["second"], "B");
        assert_eq!(result["missing"], true);
        assert_eq!(result["active"], 1);
        assert_eq!(result["cells"], json!([2, 1]));
        assert_eq!(result["rowText"], "Pilot");
        assert_eq!(result["rows"], 1);
    }

    #[tokio::test]
    async fn test_url_and_base_url_helpers() {
        let mut sandbox = loaded(
            r#"
            function createDemo(ctx) {
              return {
                urls: async () => {
                  const u = new URL("/search?keyword=a b", "https://site.example/home");
                  u.searchParams.set("page", "2");
                  return {
                    href: u.href,
                    host: u.host,
                    keyword: u.searchParams.get("keyword"),
                    custom: ctx.createCustomBaseUrl("https://site.example", "mirror.example/"),
                    fallback: ctx.createCustomBaseUrl("https://site.example"),
                  };
                },
              };
            }
            "#,
            "createDemo",
        );
        let result = sandbox.call("urls", &[]).await.unwrap();
        assert_eq!(result["href"], "https://site.example/search?keyword=a+b&page=2");
        assert_eq!(result["host"], "site.example");
        assert_eq!(result["keyword"], "a b");
        assert_eq!(result["custom"], "https://mirror.example");
        assert_eq!(result["fallback"], "https://site.example");
    }

    #[tokio::test]
    async fn test_axios_and_fetch_over_http() {
        let base = testing::serve(vec![
            testing::http_response("200 OK", "application/json", r#"{"results":[{"id":"7"}]}"#),
            testing::http_response("404 Not Found", "text/plain", "gone"),
            testing::http_response("200 OK", "text/html", "<p>hi</p>"),
        ])
        .await;

        let mut sandbox = loaded(
            r#"
            function createDemo(ctx) {
              return {
                run: async (base) => {
                  const { data } = await ctx.axios.get(`${base}/api`, { params: { q: "x" } });
                  let status = null;
                  try {
                    await ctx.axios.get(`${base}/missing`);
                  } catch (err) {
                    status = err.response.status;
                  }
                  const res = await fetch(`${base}/page`);
                  return { id: data.results[0].id, status, ok: res.ok, body: await res.text() };
                },
              };
            }
            "#,
            "createDemo",
        );
        let result = sandbox.call("run", &[json!(base)]).await.unwrap();
        assert_eq!(result, json!({ "id": "7", "status": 404, "ok": true, "body": "<p>hi</p>" }));
    }

    #[tokio::test]
    async fn test_extractor_routing_from_script() {
        let mut sandbox = loaded(
            r#"
            function createDemo(ctx) {
              return {
                fetchEpisodeSources: async (id) => new ctx.extractors.VidCloud().extract(`https://embed.example/${id}`),
              };
            }
            "#,
            "createDemo",
        );
        let result = sandbox.call("fetchEpisodeSources", &[json!("ep-3")]).await.unwrap();
        assert_eq!(result["sources"][0]["url"], "https://embed.example/ep-3/master.m3u8");
        assert_eq!(result["sources"][0]["isM3U8"], true);
    }

    #[tokio::test]
    async fn test_method_rejection_and_missing_method() {
        let mut sandbox = loaded(
            "function createDemo() { return { search: async () => { throw new Error('site down'); } }; }",
            "createDemo",
        );
        let err = sandbox.call("search", &[json!("x")]).await.unwrap_err();
        assert!(err.to_string().contains("site down"));

        let err = sandbox.call("fetchAnimeInfo", &[]).await.unwrap_err();
        assert!(matches!(err, ReelError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_extractor_context_has_native_bridge() {
        let mut sandbox = sandbox(ContextKind::Extractor);
        sandbox
            .evaluate(
                r#"
                function createVid(ctx) {
                  return {
                    extract: async () => {
                      try {
                        await ctx.native.cookieBypass("https://embed.example");
                        return { unsupported: false };
                      } catch (e) {
                        return { unsupported: true, extractors: ctx.extractors === undefined };
                      }
                    },
                  };
                }
                "#,
                "createVid",
            )
            .unwrap();
        sandbox.instantiate().unwrap();
        let result = sandbox.call("extract", &[json!("https://embed.example/e/1")]).await.unwrap();
        assert_eq!(result, json!({ "unsupported": true, "extractors": true }));
    }
}
