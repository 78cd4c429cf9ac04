//! End-to-end tests: registration through the loopback engine.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use stoa::{
    decorator, identifier, step, Context, Empty, ErrorMode, Exchange, Fault, FaultKind,
    FaultResult, Identity, Registry, Respond, Validate,
};
use stoa_engine::loopback::{LoopbackEngine, LoopbackRequest};

#[derive(Debug, Deserialize, Validate)]
struct WidgetQuery {
    id: i64,
}

#[derive(Debug, Serialize, Respond)]
struct Widget {
    id: i64,
    name: String,
}

async fn get_widget(_ctx: Context, query: WidgetQuery) -> FaultResult<Widget> {
    Ok(Widget {
        id: query.id,
        name: "lid".to_string(),
    })
}

fn mounted(registry: Registry) -> LoopbackEngine {
    let mut engine = LoopbackEngine::new();
    registry.freeze().expect("freeze should succeed").mount(&mut engine);
    engine
}

#[tokio::test]
async fn json_route_binds_path_param_and_renders() {
    let mut registry = Registry::new();
    registry
        .register("[GET] /api/v1/widgets/:id 200 json", get_widget)
        .unwrap();

    let engine = mounted(registry);
    let response = engine
        .dispatch(LoopbackRequest::get("/api/v1/widgets/7"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json().unwrap(),
        json!({"id": 7, "name": "lid"})
    );
}

#[tokio::test]
async fn status_only_route_writes_no_body() {
    let mut registry = Registry::new();
    registry
        .register(
            "[DELETE] /api/v1/widgets/:id 204",
            |_ctx: Context, _query: WidgetQuery| async move { Ok(()) },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine
        .dispatch(LoopbackRequest::delete("/api/v1/widgets/7"))
        .await;

    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn domain_fault_maps_through_taxonomy_in_production() {
    let mut registry = Registry::new();
    registry
        .register(
            "[GET] /fail 200 json",
            |_ctx: Context, _input: Empty| async move {
                Err::<Widget, _>(Fault::bad_request("invalid id"))
            },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/fail")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json().unwrap();
    assert_eq!(body["message"], "INVALID_ID");
    assert!(body.get("stack").is_none());
}

#[tokio::test]
async fn domain_fault_exposes_stack_in_development() {
    let mut registry = Registry::new();
    registry.set_error_mode(ErrorMode::Development);
    registry
        .register(
            "[GET] /fail 200 json",
            |_ctx: Context, _input: Empty| async move {
                Err::<Widget, _>(Fault::bad_request("invalid id"))
            },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/fail")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json().unwrap();
    assert_eq!(body["message"], "INVALID_ID");
    assert!(body["stack"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn unclassified_fault_is_500_in_both_modes() {
    for mode in [ErrorMode::Production, ErrorMode::Development] {
        let mut registry = Registry::new();
        registry.set_error_mode(mode);
        registry
            .register(
                "[GET] /boom 200 json",
                |_ctx: Context, _input: Empty| async move {
                    Err::<Widget, _>(Fault::new(FaultKind::Unclassified, "boom"))
                },
            )
            .unwrap();

        let engine = mounted(registry);
        let response = engine.dispatch(LoopbackRequest::get("/boom")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

#[tokio::test]
async fn identity_gate_denies_and_allows() {
    let mut registry = Registry::new();
    registry.identifier(identifier(|ex, roles, _permissions| {
        let authorized = ex.header("x-token") == Some("secret");
        let roles = roles.to_vec();
        Box::pin(async move {
            if !authorized {
                return Err(Fault::unauthorized("missing token"));
            }
            assert_eq!(roles, ["admin"]);
            let mut identity = Identity::new();
            identity.insert("subject", json!("user-9"));
            Ok(identity)
        })
    }));
    registry
        .register(
            "@authorize(admin:::read)\n[GET] /secure 200 json",
            |ctx: Context, _input: Empty| async move {
                let subject = ctx
                    .identity()
                    .and_then(|identity| identity.get("subject"))
                    .cloned()
                    .unwrap_or_default();
                Ok(json!({ "subject": subject }))
            },
        )
        .unwrap();

    let engine = mounted(registry);

    let denied = engine.dispatch(LoopbackRequest::get("/secure")).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    assert!(denied.body.is_empty(), "denied requests carry no body");

    let allowed = engine
        .dispatch(LoopbackRequest::get("/secure").header("x-token", "secret"))
        .await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.json().unwrap()["subject"], "user-9");
}

#[tokio::test]
async fn chain_runs_in_registration_order() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();

    let before_log = Arc::clone(&log);
    registry
        .register_before(
            "[GET] /ordered 200 json",
            step(move |_ex| {
                let log = Arc::clone(&before_log);
                Box::pin(async move {
                    log.lock().unwrap().push("before");
                })
            }),
        )
        .unwrap();

    let decorator_log = Arc::clone(&log);
    registry.decorator(
        "trace",
        decorator(move |_ex| {
            let log = Arc::clone(&decorator_log);
            Box::pin(async move {
                log.lock().unwrap().push("decorator");
                Ok(())
            })
        }),
    );

    let main_log = Arc::clone(&log);
    registry
        .register(
            "@trace\n[GET] /ordered 200 json",
            move |_ctx: Context, _input: Empty| {
                let log = Arc::clone(&main_log);
                async move {
                    log.lock().unwrap().push("main");
                    Ok(json!({"status": "ok"}))
                }
            },
        )
        .unwrap();

    let after_log = Arc::clone(&log);
    registry
        .register_after(
            "[GET] /ordered 200 json",
            step(move |_ex| {
                let log = Arc::clone(&after_log);
                Box::pin(async move {
                    log.lock().unwrap().push("after");
                })
            }),
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/ordered")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before", "decorator", "main", "after"]
    );
}

#[tokio::test]
async fn redirect_mode_uses_declared_status_and_location() {
    let mut registry = Registry::new();
    registry
        .register(
            "[GET] /old 302 redirect",
            |_ctx: Context, _input: Empty| async move { Ok("/login".to_string()) },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/old")).await;

    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/login"));
}

#[tokio::test]
async fn attachment_mode_sets_content_type_and_filename() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("report.pdf");
    std::fs::write(&file, b"%PDF-").unwrap();
    let path = file.to_str().unwrap().to_string();

    let mut registry = Registry::new();
    registry
        .register(
            "[GET] /report 200 attachment@application/pdf",
            move |_ctx: Context, _input: Empty| {
                let path = path.clone();
                async move { Ok(path) }
            },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/report")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/pdf"));
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename=\"report.pdf\"")
    );
}

#[tokio::test]
async fn data_mode_writes_bytes_with_declared_content_type() {
    let mut registry = Registry::new();
    registry
        .register(
            "[POST] /export 200 data@application/yaml; charset=utf-8",
            |_ctx: Context, _input: Empty| async move { Ok(b"a: 1\n".to_vec()) },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::post("/export")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.header("content-type"),
        Some("application/yaml; charset=utf-8")
    );
    assert_eq!(response.body_string(), "a: 1\n");
}

#[tokio::test]
async fn template_mode_renders_named_template() {
    #[derive(Serialize, Respond)]
    struct Page {
        title: String,
    }

    let mut registry = Registry::new();
    registry
        .register(
            "[GET] /hello 200 hello.html",
            |_ctx: Context, _input: Empty| async move {
                Ok(Page {
                    title: "Widgets".to_string(),
                })
            },
        )
        .unwrap();

    let mut engine = LoopbackEngine::new();
    engine
        .add_template("hello.html", "<h1>{{ title }}</h1>")
        .unwrap();
    registry.freeze().unwrap().mount(&mut engine);

    let response = engine.dispatch(LoopbackRequest::get("/hello")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body_string(), "<h1>Widgets</h1>");
}

#[tokio::test]
async fn xml_mode_serializes_output() {
    let mut registry = Registry::new();
    registry
        .register("[GET] /widget 200 xml", |_ctx: Context, _input: Empty| {
            async move {
                Ok(Widget {
                    id: 7,
                    name: "lid".to_string(),
                })
            }
        })
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/widget")).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.body_string();
    assert!(body.contains("<id>7</id>"));
    assert!(body.contains("<name>lid</name>"));
}

#[tokio::test]
async fn json_mode_escapes_html_and_pure_json_does_not() {
    #[derive(Serialize, Respond)]
    struct Snippet {
        html: String,
    }

    fn snippet() -> Snippet {
        Snippet {
            html: "<p>Hello</p>".to_string(),
        }
    }

    let mut registry = Registry::new();
    registry
        .register(
            "[GET] /escaped 200 json",
            |_ctx: Context, _input: Empty| async move { Ok(snippet()) },
        )
        .unwrap();
    registry
        .register(
            "[GET] /verbatim 200 pure-json",
            |_ctx: Context, _input: Empty| async move { Ok(snippet()) },
        )
        .unwrap();

    let engine = mounted(registry);

    let escaped = engine.dispatch(LoopbackRequest::get("/escaped")).await;
    assert!(escaped.body_string().contains("\\u003cp\\u003e"));

    let verbatim = engine.dispatch(LoopbackRequest::get("/verbatim")).await;
    assert!(verbatim.body_string().contains("<p>Hello</p>"));
}

#[tokio::test]
async fn bind_failure_is_422_with_detail_only_in_development() {
    for mode in [ErrorMode::Production, ErrorMode::Development] {
        let mut registry = Registry::new();
        registry.set_error_mode(mode);
        registry
            .register("[GET] /widgets/:id 200 json", get_widget)
            .unwrap();

        let engine = mounted(registry);
        let response = engine
            .dispatch(LoopbackRequest::get("/widgets/not-a-number"))
            .await;

        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        match mode {
            ErrorMode::Production => assert!(response.body.is_empty()),
            ErrorMode::Development => {
                let body = response.json().unwrap();
                let message = body["message"].as_str().unwrap();
                assert!(message.contains("API=/widgets/:id"));
                assert!(message.contains("Method=GET"));
            }
        }
    }
}

#[tokio::test]
async fn validation_failure_aborts_with_400() {
    #[derive(Debug, Deserialize)]
    struct BoundedQuery {
        id: i64,
    }

    impl Validate for BoundedQuery {
        fn validate(&self) -> FaultResult<()> {
            if self.id < 1 {
                return Err(Fault::bad_request("invalid id"));
            }
            Ok(())
        }
    }

    let invoked: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
    let seen = Arc::clone(&invoked);

    let mut registry = Registry::new();
    registry
        .register(
            "[GET] /bounded/:id 200 json",
            move |_ctx: Context, query: BoundedQuery| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = true;
                    Ok(json!({"id": query.id}))
                }
            },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/bounded/0")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json().unwrap()["message"], "INVALID_ID");
    assert!(!*invoked.lock().unwrap(), "invalid input must not reach business code");
}

#[tokio::test]
async fn global_middleware_runs_for_every_request() {
    let mut registry = Registry::new();
    registry.use_middleware(step(|ex| {
        Box::pin(async move {
            ex.set_value("request-seen", json!(true));
        })
    }));
    registry
        .register(
            "[GET] /observed 200 json",
            |ctx: Context, _input: Empty| async move {
                Ok(json!({"seen": ctx.value("request-seen").is_some()}))
            },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine.dispatch(LoopbackRequest::get("/observed")).await;
    assert_eq!(response.json().unwrap()["seen"], true);
}

#[tokio::test]
async fn query_parameters_bind_into_input() {
    #[derive(Debug, Deserialize, Validate)]
    struct PageQuery {
        page: u32,
        sort: String,
    }

    let mut registry = Registry::new();
    registry
        .register(
            "[GET] /widgets 200 json",
            |_ctx: Context, query: PageQuery| async move {
                Ok(json!({"page": query.page, "sort": query.sort}))
            },
        )
        .unwrap();

    let engine = mounted(registry);
    let response = engine
        .dispatch(LoopbackRequest::get("/widgets?page=2&sort=name"))
        .await;

    assert_eq!(
        response.json().unwrap(),
        json!({"page": 2, "sort": "name"})
    );
}

#[tokio::test]
async fn capability_mismatch_fails_at_registration() {
    let mut registry = Registry::new();
    let err = registry
        .register(
            "[GET] /bytes-as-text 200 text",
            |_ctx: Context, _input: Empty| async move { Ok(vec![0u8, 1, 2]) },
        )
        .unwrap_err();

    assert!(err.to_string().contains("text"));
}
