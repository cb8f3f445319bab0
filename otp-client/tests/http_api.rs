//! `HttpApi` against a local axum server standing in for the OTP service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use base64::Engine;
use serde_json::{Value, json};

use otp_client::{ApiError, HttpApi, OtpApi, UpdateVerb};
use otp_core::{DeviceKey, NewDevice, NewUser, RecordId, TotpAttempt};

/// Requests seen by the fake server, as `"<METHOD> <path> <body>"`.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

const TINY_PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

async fn update_user(
    State(journal): State<Journal>,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    journal.push(format!("PATCH /users/{user_id} {body}"));
    Json(json!({"ok": true}))
}

async fn list_logs(
    State(journal): State<Journal>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    journal.push(format!("GET /logs limit={:?}", params.get("limit")));
    Json(json!({
        "logs": [{"device_name": "PC1", "action": "OTP incorrecto", "log_type": "otp_invalid"}],
        "count": 1
    }))
}

fn api_routes() -> Router<Journal> {
    Router::new()
        .route(
            "/devices",
            get(|| async {
                Json(json!({
                    "devices": [{"id": 1, "name": "PC1", "enabled": true, "otp": "123456"}],
                    "logs": [{"device": "PC1", "action": "Exitoso", "timestamp": "2024-05-01T10:00:00Z"}]
                }))
            })
            .post(|State(journal): State<Journal>, Json(body): Json<Value>| async move {
                journal.push(format!("POST /devices {body}"));
                (
                    StatusCode::CREATED,
                    Json(json!({"message": "ok", "device": {"id": 9, "name": body["name"], "enabled": true, "otp": "777777"}})),
                )
            }),
        )
        .route(
            "/devices/register",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "message": "Dispositivo registrado exitosamente",
                    "device": {"name": body["device_name"], "enabled": true, "otp": "000000"}
                }))
            }),
        )
        .route(
            "/devices/{key}",
            patch(update_device)
                .put(update_device)
                .delete(|State(journal): State<Journal>, Path(key): Path<String>| async move {
                    journal.push(format!("DELETE /devices/{key}"));
                    StatusCode::NO_CONTENT
                }),
        )
        .route(
            "/devices/{key}/status",
            get(|Path(name): Path<String>| async move {
                if name == "ghost" {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(json!({"authorized": false, "message": "Dispositivo no registrado", "device_name": name})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({"authorized": true, "device": {"name": name, "enabled": true}})),
                )
            }),
        )
        .route(
            "/users",
            get(|| async {
                Json(json!({"users": [
                    {"user_id": "u1", "full_name": "Ana", "email": "ana@example.com", "status_user": true},
                    {"user_id": "u2", "full_name": "Luis", "email": "luis@example.com", "status_user": false}
                ], "message": "Usuarios cargados correctamente"}))
            })
            .post(|State(journal): State<Journal>, Json(body): Json<Value>| async move {
                journal.push(format!("POST /users {body}"));
                StatusCode::CREATED
            }),
        )
        .route("/users/{user_id}", patch(update_user))
        .route(
            "/users/{user_id}/qr",
            get(|Path(user_id): Path<String>| async move {
                if user_id == "raw" {
                    return TINY_PNG.to_vec().into_response();
                }
                let encoded = base64::engine::general_purpose::STANDARD.encode(TINY_PNG);
                Json(json!({"user_id": user_id, "qr": format!("data:image/png;base64,{encoded}")}))
                    .into_response()
            }),
        )
        .route("/logs", get(list_logs))
        .route(
            "/validate_totp",
            post(|Json(body): Json<Value>| async move {
                if body["user_id"] == "boom" {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"valid": false, "error": "Error interno del servidor"})),
                    );
                }
                if body["otp"] == "123456" {
                    return (
                        StatusCode::OK,
                        Json(json!({"valid": true, "message": "Autenticación exitosa", "user": {"user_id": body["user_id"]}})),
                    );
                }
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"valid": false, "message": "Código OTP incorrecto"})),
                )
            }),
        )
}

async fn update_device(
    State(journal): State<Journal>,
    method: axum::http::Method,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    journal.push(format!("{method} /devices/{key} {body}"));
    if key == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Dispositivo no encontrado"})),
        );
    }
    (StatusCode::OK, Json(json!({"ok": true})))
}

async fn spawn_server() -> (String, Journal) {
    let journal = Journal::default();
    let app = Router::new()
        .nest("/api", api_routes())
        .route(
            "/",
            get(|| async {
                Json(json!({"service": "OTP Authentication API", "version": "2.0", "status": "online"}))
            }),
        )
        .with_state(journal.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api"), journal)
}

fn client(base: &str) -> HttpApi {
    HttpApi::new(base, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn lists_devices_and_logs() {
    let (base, _) = spawn_server().await;
    let snapshot = client(&base).list_devices().await.unwrap();

    assert_eq!(snapshot.devices.len(), 1);
    assert_eq!(snapshot.devices[0].name, "PC1");
    assert_eq!(snapshot.devices[0].id, Some(RecordId::Int(1)));
    assert!(snapshot.logs[0].is_success());
}

#[tokio::test]
async fn creates_device_and_reads_echo() {
    let (base, journal) = spawn_server().await;
    let echoed = client(&base)
        .create_device(&NewDevice {
            name: "PC2".into(),
            otp: "654321".into(),
            enabled: true,
        })
        .await
        .unwrap()
        .expect("server echoes the device");

    assert_eq!(echoed.name, "PC2");
    assert_eq!(echoed.otp.as_deref(), Some("777777"));
    assert_eq!(
        journal.entries(),
        vec![r#"POST /devices {"enabled":true,"name":"PC2","otp":"654321"}"#.to_string()]
    );
}

#[tokio::test]
async fn toggles_with_configured_verb() {
    let (base, journal) = spawn_server().await;

    client(&base)
        .set_device_enabled(&DeviceKey::Name("Sala 2/B".into()), false)
        .await
        .unwrap();
    client(&base)
        .with_update_verb(UpdateVerb::Put)
        .set_device_enabled(&DeviceKey::Id(RecordId::Int(4)), true)
        .await
        .unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            r#"PATCH /devices/Sala 2/B {"enabled":false}"#.to_string(),
            r#"PUT /devices/4 {"enabled":true}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn non_success_status_carries_server_message() {
    let (base, _) = spawn_server().await;
    let err = client(&base)
        .set_device_enabled(&DeviceKey::Name("missing".into()), true)
        .await
        .unwrap_err();

    match err {
        ApiError::Server { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Dispositivo no encontrado");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn deletes_by_key() {
    let (base, journal) = spawn_server().await;
    client(&base)
        .delete_device(&DeviceKey::Id(RecordId::Text("abc".into())))
        .await
        .unwrap();
    assert_eq!(journal.entries(), vec!["DELETE /devices/abc".to_string()]);
}

#[tokio::test]
async fn registers_device_and_checks_status() {
    let (base, _) = spawn_server().await;
    let api = client(&base);

    let registration = api.register_device("LAB-3").await.unwrap();
    assert_eq!(registration.device.unwrap().otp.as_deref(), Some("000000"));

    let known = api.device_status("LAB-3").await.unwrap();
    assert!(known.authorized);

    let unknown = api.device_status("ghost").await.unwrap();
    assert!(!unknown.authorized);
    assert_eq!(unknown.message.as_deref(), Some("Dispositivo no registrado"));
}

#[tokio::test]
async fn user_endpoints() {
    let (base, journal) = spawn_server().await;
    let api = client(&base);

    let users = api.list_users().await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(!users[1].status_user);

    api.create_user(&NewUser {
        user_id: "u3".into(),
        full_name: "Eva".into(),
        email: "eva@example.com".into(),
        cedula: "123".into(),
    })
    .await
    .unwrap();
    api.set_user_status("u2", true).await.unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            r#"POST /users {"cedula":"123","email":"eva@example.com","full_name":"Eva","user_id":"u3"}"#
                .to_string(),
            r#"PATCH /users/u2 {"status_user":true}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn qr_accepts_json_and_binary_bodies() {
    let (base, _) = spawn_server().await;
    let api = client(&base);

    let wrapped = api.user_qr("u1").await.unwrap();
    let raw = api.user_qr("raw").await.unwrap();
    assert_eq!(wrapped, raw);
    assert_eq!(raw.as_bytes(), &TINY_PNG[..]);
}

#[tokio::test]
async fn logs_forward_limit() {
    let (base, journal) = spawn_server().await;
    let api = client(&base);

    let logs = api.list_logs(Some(25)).await.unwrap();
    assert_eq!(logs[0].device.as_deref(), Some("PC1"));
    api.list_logs(None).await.unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            r#"GET /logs limit=Some("25")"#.to_string(),
            "GET /logs limit=None".to_string(),
        ]
    );
}

#[tokio::test]
async fn rejected_codes_are_verdicts_but_server_faults_are_errors() {
    let (base, _) = spawn_server().await;
    let api = client(&base);
    let attempt = |user_id: &str, otp: &str| TotpAttempt {
        user_id: user_id.into(),
        otp: otp.into(),
        device_name: "PC1".into(),
    };

    let accepted = api.validate_totp(&attempt("u1", "123456")).await.unwrap();
    assert!(accepted.valid);

    let rejected = api.validate_totp(&attempt("u1", "000000")).await.unwrap();
    assert!(!rejected.valid);
    assert_eq!(rejected.message.as_deref(), Some("Código OTP incorrecto"));

    let err = api.validate_totp(&attempt("boom", "000000")).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn service_info_lives_at_the_root() {
    let (base, _) = spawn_server().await;
    let info = client(&base).service_info().await.unwrap();
    assert_eq!(info.service, "OTP Authentication API");
    assert_eq!(info.status, "online");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}/api"))
        .list_devices()
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
}
