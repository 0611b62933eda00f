use httpmock::Method::{DELETE, GET, POST, PUT};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use stocksync_client::{HttpInventoryApi, InventoryApi, ListQuery, RuntimeContext};
use stocksync_core::{AppConfig, Error};

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn api_for(server: &MockServer, token: Option<&str>) -> HttpInventoryApi {
    let config = AppConfig { api_base_url: server.base_url(), timeout_ms: 2_000, ..Default::default() };
    HttpInventoryApi::new(&config, RuntimeContext::new(true, token.map(String::from))).unwrap()
}

#[tokio::test]
async fn api_client_success_paths() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let token = "secret-token";
    let product_id = "6f1c2d3e-0000-4000-8000-000000000001";

    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/api/inventory")
            .query_param("search", "tee")
            .query_param("limit", "20")
            .query_param("offset", "20")
            .header("authorization", format!("Bearer {token}"));
        then.status(200).json_body(json!({
            "products": [{"id": product_id, "title": "Blue Tee", "sku": "TS-1", "quantity": 4}],
            "total": 21
        }));
    });

    let upload = server.mock(|when, then| {
        when.method(POST)
            .path("/api/inventory/upload")
            .header("authorization", format!("Bearer {token}"))
            .body_contains("name=\"file\"")
            .body_contains("filename=\"stock.csv\"");
        then.status(200).json_body(json!({
            "message": "CSV procesado correctamente",
            "filename": "stock.csv",
            "stats": {"inserted": 2, "updated": 1, "errors": ["Fila sin título omitida (SKU: N/A)"]}
        }));
    });

    let update = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("/api/inventory/{product_id}"))
            .header("authorization", format!("Bearer {token}"))
            .json_body(json!({"quantity": 9}));
        then.status(200)
            .json_body(json!({"id": product_id, "title": "Blue Tee", "sku": "TS-1", "quantity": 9}));
    });

    let delete = server.mock(|when, then| {
        when.method(DELETE)
            .path(format!("/api/inventory/{product_id}"))
            .header("authorization", format!("Bearer {token}"));
        then.status(200).json_body(json!({"message": "Producto eliminado", "id": product_id}));
    });

    let api = api_for(&server, Some(token));

    let page = api.list(&ListQuery::page(Some(" tee "), 2, 20)).await.unwrap();
    assert_eq!(page.total, 21);
    assert_eq!(page.products[0].sku.as_deref(), Some("TS-1"));
    assert_eq!(page.products[0].fields["quantity"], 4);

    let receipt = api.upload("stock.csv", b"sku,title\nTS-1,Blue Tee\n".to_vec()).await.unwrap();
    assert_eq!(receipt.stats.inserted, 2);
    assert_eq!(receipt.stats.updated, 1);
    assert_eq!(receipt.stats.errors.len(), 1);

    let fields = json!({"quantity": 9}).as_object().cloned().unwrap();
    let entity = api.update(product_id, &fields).await.unwrap();
    assert_eq!(entity.fields["quantity"], 9);

    api.delete(product_id).await.unwrap();

    list.assert();
    upload.assert();
    update.assert();
    delete.assert();
}

#[tokio::test]
async fn api_client_maps_error_statuses() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/api/inventory");
        then.status(401).json_body(json!({"error": "Token expirado"}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/api/inventory/upload");
        then.status(503).json_body(json!({"error": "Servicio no disponible"}));
    });
    server.mock(|when, then| {
        when.method(DELETE).path("/api/inventory/missing");
        then.status(404).json_body(json!({"error": "Producto no encontrado"}));
    });
    server.mock(|when, then| {
        when.method(PUT).path("/api/inventory/bad");
        then.status(200).body("not json");
    });

    let api = api_for(&server, Some("expired"));

    match api.list(&ListQuery::page(None, 1, 20)).await {
        Err(Error::AuthRejected(message)) => assert_eq!(message, "Token expirado"),
        other => panic!("expected AuthRejected, got {other:?}"),
    }

    let err = api.upload("stock.csv", b"x".to_vec()).await.unwrap_err();
    assert!(err.is_network());

    match api.delete("missing").await {
        Err(Error::HttpError { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Producto no encontrado");
        }
        other => panic!("expected HttpError, got {other:?}"),
    }

    let fields = json!({"title": "x"}).as_object().cloned().unwrap();
    assert!(matches!(api.update("bad", &fields).await, Err(Error::InvalidResponse(_))));
}

#[tokio::test]
async fn api_client_requires_token_before_sending() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path("/api/inventory");
        then.status(200).json_body(json!({"products": [], "total": 0}));
    });

    let api = api_for(&server, None);
    assert!(api.list(&ListQuery::page(None, 1, 20)).await.unwrap_err().is_auth());
    list.assert_hits(0);
}

#[tokio::test]
async fn api_client_unreachable_server_is_network_unavailable() {
    let config = AppConfig { api_base_url: "http://127.0.0.1:9".into(), timeout_ms: 500, ..Default::default() };
    let api = HttpInventoryApi::new(&config, RuntimeContext::new(true, Some("t".into()))).unwrap();

    let err = api.list(&ListQuery::page(None, 1, 20)).await.unwrap_err();
    assert!(err.is_network());
}
