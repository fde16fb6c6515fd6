//! HTTP router.
//!
//! Returns a composable `Router` with every route under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. CORS → 2. Trace → 3. `Cache-Control: no-store` → 4. Auth → 5. Access log

use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer of
/// each group). Endpoint handlers use `State<ApiContext>`.
pub fn api_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/session", get(endpoints::session::current))
        .route(
            "/doctors",
            get(endpoints::doctors::list).post(endpoints::doctors::add),
        )
        .route(
            "/doctors/:id",
            axum::routing::patch(endpoints::doctors::update),
        )
        .route("/doctors/:id/schedule", get(endpoints::doctors::schedule))
        .route(
            "/registrations",
            axum::routing::post(endpoints::registrations::create),
        )
        .route("/patients", get(endpoints::patients::list))
        .route("/patients/by-file/:file_no", get(endpoints::patients::by_file))
        .route("/visits/upcoming", get(endpoints::visits::upcoming))
        .with_state(ctx.clone())
        // Innermost first, outermost last
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_session))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::audit::log_access));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .nest("/api", unprotected.merge(protected))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::StaticToken;
    use crate::directory::DirectoryCache;
    use crate::session::{Authenticator, TokenRegistry};
    use crate::store::testing::memory_store;
    use crate::store::{AnyStore, Collection, DataStore, Row};

    const STAFF: &str = "staff-token";
    const ADMIN: &str = "admin-token";

    async fn test_context() -> ApiContext {
        let store = memory_store();
        let mut admin = Row::new();
        admin.insert("id".into(), json!("u-admin"));
        admin.insert("role".into(), json!("admin"));
        admin.insert("display_name".into(), json!("Clinic Admin"));
        store.insert(Collection::Profiles, admin).await.unwrap();

        let tokens = [
            StaticToken {
                token: STAFF.into(),
                user_id: "u-staff".into(),
                email: Some("desk@clinic.test".into()),
            },
            StaticToken {
                token: ADMIN.into(),
                user_id: "u-admin".into(),
                email: None,
            },
        ];
        ApiContext::new(
            AnyStore::Sqlite(store),
            Arc::new(DirectoryCache::new()),
            Authenticator::Tokens(TokenRegistry::new(&tokens)),
        )
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(ctx: &ApiContext, req: Request<Body>) -> (StatusCode, Value) {
        let response = api_router(ctx.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        assert_eq!(
            response.headers().get("Cache-Control").unwrap(),
            "no-store"
        );
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn add_doctor(ctx: &ApiContext, name: &str) -> String {
        let (status, json) = send(
            ctx,
            request("POST", "/api/doctors", Some(ADMIN), Some(json!({ "name": name }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let ctx = test_context().await;
        let (status, json) = send(&ctx, request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["store"], "sqlite");
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let ctx = test_context().await;
        for uri in ["/api/session", "/api/patients", "/api/visits/upcoming"] {
            let (status, json) = send(&ctx, request("GET", uri, None, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
        }
        let (status, _) = send(&ctx, request("GET", "/api/session", Some("bogus"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_resolves_roles() {
        let ctx = test_context().await;
        let (status, json) = send(&ctx, request("GET", "/api/session", Some(STAFF), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["role"], "staff");
        assert_eq!(json["display_name"], "desk@clinic.test");

        let (_, json) = send(&ctx, request("GET", "/api/session", Some(ADMIN), None)).await;
        assert_eq!(json["role"], "admin");
        assert_eq!(json["display_name"], "Clinic Admin");
    }

    #[tokio::test]
    async fn doctor_administration_is_admin_only() {
        let ctx = test_context().await;
        let (status, json) = send(
            &ctx,
            request("POST", "/api/doctors", Some(STAFF), Some(json!({ "name": "Dr X" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "FORBIDDEN");

        let (status, _) = send(&ctx, request("GET", "/api/doctors?all=true", Some(STAFF), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deactivated_doctor_leaves_selection_list() {
        let ctx = test_context().await;
        let mona = add_doctor(&ctx, "Dr Mona").await;
        add_doctor(&ctx, "Dr Amir").await;

        let (_, json) = send(&ctx, request("GET", "/api/doctors", Some(STAFF), None)).await;
        assert_eq!(json["doctors"][0]["name"], "Dr Amir");
        assert_eq!(json["doctors"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &ctx,
            request(
                "PATCH",
                &format!("/api/doctors/{mona}"),
                Some(ADMIN),
                Some(json!({ "active": false })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = send(&ctx, request("GET", "/api/doctors", Some(STAFF), None)).await;
        assert_eq!(json["doctors"].as_array().unwrap().len(), 1);
        let (_, json) = send(&ctx, request("GET", "/api/doctors?all=true", Some(ADMIN), None)).await;
        assert_eq!(json["doctors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn registration_flow() {
        let ctx = test_context().await;
        let doctor = add_doctor(&ctx, "Dr Mona").await;
        let today = chrono::Local::now().date_naive().to_string();

        let form = json!({
            "clinic_file_no": "100",
            "full_name": "Alice",
            "phone": "555-0100",
            "notes": "",
            "assigned_doctor_id": doctor,
            "visit_date": today,
            "visit_time": "09:00",
            "doctor_id": "",
            "purpose": "checkup"
        });
        let (status, json) =
            send(&ctx, request("POST", "/api/registrations", Some(STAFF), Some(form))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["patient_created"], true);
        let patient_id = json["patient_id"].clone();

        let (status, record) =
            send(&ctx, request("GET", "/api/patients/by-file/100", Some(STAFF), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["id"], patient_id);
        assert_eq!(record["assigned_doctor"]["name"], "Dr Mona");
        assert_eq!(record["visits"][0]["doctor_id"], doctor.as_str());
        assert_eq!(record["visits"][0]["created_by"], "u-staff");
        assert!(record["notes"].is_null());

        let (_, listed) = send(
            &ctx,
            request(
                "GET",
                &format!("/api/patients?doctor_id={doctor}&date={today}&q=ALI"),
                Some(STAFF),
                None,
            ),
        )
        .await;
        assert_eq!(listed["patients"].as_array().unwrap().len(), 1);

        let (_, upcoming) =
            send(&ctx, request("GET", "/api/visits/upcoming", Some(STAFF), None)).await;
        assert_eq!(upcoming["start"], today.as_str());
        assert_eq!(upcoming["visits"][0]["patient_label"], "100 • Alice");
        assert_eq!(upcoming["visits"][0]["doctor_label"], "Dr Mona");

        let (_, schedule) = send(
            &ctx,
            request("GET", &format!("/api/doctors/{doctor}/schedule"), Some(STAFF), None),
        )
        .await;
        assert_eq!(schedule["patients"].as_array().unwrap().len(), 1);
        assert_eq!(schedule["visits"][0]["visit_time"], "09:00:00");
    }

    #[tokio::test]
    async fn registration_validation_is_400() {
        let ctx = test_context().await;
        let (status, json) = send(
            &ctx,
            request(
                "POST",
                "/api/registrations",
                Some(STAFF),
                Some(json!({ "clinic_file_no": " ", "full_name": "Alice", "visit_date": "" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION");
        assert_eq!(json["error"]["missing"], json!(["clinic_file_no", "visit_date"]));
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let ctx = test_context().await;
        let (status, json) = send(
            &ctx,
            request(
                "POST",
                "/api/registrations",
                Some(STAFF),
                Some(json!({ "clinic_file_no": "1", "full_name": "A", "visit_date": "10/01/2024" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn unknown_file_number_is_404() {
        let ctx = test_context().await;
        let (status, json) =
            send(&ctx, request("GET", "/api/patients/by-file/999", Some(STAFF), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn invalid_filter_date_is_400() {
        let ctx = test_context().await;
        let (status, _) = send(
            &ctx,
            request("GET", "/api/patients?date=yesterday", Some(STAFF), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            &ctx,
            request("GET", "/api/patients?doctor_id=&date=&q=", Some(STAFF), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["patients"].as_array().unwrap().is_empty());
    }

    /// Hosted auth + data service that records which credential each data call carried.
    async fn recording_hosted_service() -> (String, Arc<std::sync::Mutex<Vec<(String, String)>>>) {
        use axum::http::{HeaderMap, Uri};
        use axum::response::IntoResponse;
        use axum::Json;

        let seen: Arc<std::sync::Mutex<Vec<(String, String)>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap| {
            let recorder = Arc::clone(&recorder);
            async move {
                let bearer = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let path = uri.path().to_string();
                if path.starts_with("/rest/v1/") {
                    recorder.lock().unwrap().push((path.clone(), bearer.clone()));
                }
                match path.as_str() {
                    "/auth/v1/user" if bearer == "Bearer user-jwt" => {
                        Json(json!({"id": "u-42", "email": "nurse@clinic.test"})).into_response()
                    }
                    "/auth/v1/user" => StatusCode::UNAUTHORIZED.into_response(),
                    "/rest/v1/profiles" => {
                        Json(json!([{"id": "u-42", "role": "staff", "display_name": null}]))
                            .into_response()
                    }
                    "/rest/v1/patients" | "/rest/v1/doctors" => Json(json!([])).into_response(),
                    _ => StatusCode::NOT_FOUND.into_response(),
                }
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn hosted_store_calls_run_as_the_caller() {
        use crate::session::RemoteAuth;
        use crate::store::RestStore;

        let (base, seen) = recording_hosted_service().await;
        let ctx = ApiContext::new(
            AnyStore::Rest(RestStore::new(&base, "anon-key", 5).unwrap()),
            Arc::new(DirectoryCache::new()),
            Authenticator::Remote(RemoteAuth::new(&base, "anon-key", 5).unwrap()),
        );

        let (status, json) = send(&ctx, request("GET", "/api/session", Some("user-jwt"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user_id"], "u-42");
        assert!(json.get("access_token").is_none());

        let (status, _) = send(&ctx, request("GET", "/api/patients", Some("user-jwt"), None)).await;
        assert_eq!(status, StatusCode::OK);

        let seen = seen.lock().unwrap().clone();
        let paths: Vec<&str> = seen.iter().map(|(path, _)| path.as_str()).collect();
        assert!(paths.contains(&"/rest/v1/profiles"), "{paths:?}");
        assert!(paths.contains(&"/rest/v1/doctors"), "{paths:?}");
        assert!(paths.contains(&"/rest/v1/patients"), "{paths:?}");
        for (path, bearer) in &seen {
            assert_eq!(bearer, "Bearer user-jwt", "{path}");
        }
    }
}
