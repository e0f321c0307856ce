//! Reconciliation job end to end, with the bank and the CRM portal served by
//! one wiremock server.

use std::time::Duration;

use chrono::NaiveDate;
use remit::{AppConfig, JobError, JobSettings, Outcome, ReconcileJob, RunSummary};
use remit_bank::{BankClient, BankConfig};
use remit_crm::{CrmClient, CrmConfig, InvoiceSchema};
use remit_storage::{BankCredentials, CrmCredentials, SecretStore};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Helpers
// =============================================================================

const STATEMENTS: &str = "/openapi/api/v1/bank-statement";
const ITEM_LIST: &str = "/rest/crm.item.list.json";
const ITEM_UPDATE: &str = "/rest/crm.item.update.json";
const COMMENT_ADD: &str = "/rest/crm.timeline.comment.add.json";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 12).unwrap()
}

fn schema() -> InvoiceSchema {
    InvoiceSchema {
        paid_field: "paid".into(),
        ..Default::default()
    }
}

fn crm_credentials() -> CrmCredentials {
    CrmCredentials {
        domain: "acme.bitrix24.ru".into(),
        auth_token: "access".into(),
        refresh_token: "refresh".into(),
        client_id: "local.app".into(),
        client_secret: "s3cret".into(),
        expires_in: Some(3600),
    }
}

fn job(server: &MockServer, dir: &TempDir) -> ReconcileJob {
    let bank = BankClient::new(
        BankConfig::new(format!("{}/openapi", server.uri()))
            .with_timeout(Duration::from_secs(5))
            .with_rate_limit(1, Duration::from_millis(10)),
    )
    .unwrap();
    let crm = CrmClient::new(
        CrmConfig::default()
            .with_api_base(format!("{}/rest", server.uri()))
            .with_oauth_url(format!("{}/oauth/token/", server.uri()))
            .with_timeout(Duration::from_secs(5))
            .with_rate_limit(2, Duration::from_millis(10)),
        crm_credentials(),
        SecretStore::in_dir(dir.path()),
    )
    .unwrap();
    ReconcileJob::new(
        bank,
        crm,
        JobSettings {
            window_days: 11,
            schema: schema(),
        },
    )
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "result": result }))
}

async fn mount_statements(server: &MockServer, operations: Value) {
    Mock::given(method("GET"))
        .and(path(STATEMENTS))
        .and(query_param("accountNumber", "X"))
        .and(query_param("from", "2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "operation": operations })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_invoice(server: &MockServer, number: &str, items: Value) {
    Mock::given(method("POST"))
        .and(path(ITEM_LIST))
        .and(body_json(json!({
            "entityTypeId": "31",
            "filter": { "accountNumber": number }
        })))
        .respond_with(ok(json!({ "items": items })))
        .mount(server)
        .await;
}

fn payment(purpose: &str, amount: Value) -> Value {
    json!({
        "operationId": "op-1",
        "recipientAccount": "X",
        "paymentPurpose": purpose,
        "amount": amount,
        "payerName": "ООО Ромашка"
    })
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn unpaid_invoice_is_updated_and_commented_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_statements(&server, json!([payment("Счету №100 оплата", json!(500))])).await;
    mount_invoice(&server, "100", json!([{ "id": 7, "paid": null }])).await;

    Mock::given(method("POST"))
        .and(path(ITEM_UPDATE))
        .and(body_json(json!({
            "entityTypeId": "31",
            "id": 7,
            "fields": { "stageId": "DT31_3:P", "paid": 500 }
        })))
        .respond_with(ok(json!({ "item": { "id": 7 } })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(COMMENT_ADD))
        .and(body_partial_json(json!({
            "fields": { "ENTITY_ID": 7, "ENTITY_TYPE": "dynamic_31" }
        })))
        .respond_with(ok(json!(101)))
        .expect(1)
        .mount(&server)
        .await;

    let summary = job(&server, &dir)
        .run(&BankCredentials::new("X", "bank-token"), today())
        .await
        .unwrap();
    assert_eq!(summary.reconciled, 1);
    assert_eq!(summary.statements, 1);

    let requests = server.received_requests().await.unwrap();
    let comment = requests
        .iter()
        .find(|r| r.url.path() == COMMENT_ADD)
        .expect("comment request");
    let body: Value = serde_json::from_slice(&comment.body).unwrap();
    let text = body["fields"]["COMMENT"].as_str().unwrap();
    assert!(text.contains("Счету №100 оплата"));
    assert!(text.contains("ООО Ромашка"));
    assert!(text.contains("    \"amount\": 500"));
}

#[tokio::test]
async fn comment_and_paid_amount_carry_the_raw_entry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let raw = r#"{"operationId":"op-7","fee":0,"recipientAccount":"X","paymentPurpose":"по сч 205","amount":"1500.50","extra":100.005}"#;
    let entry: Value = serde_json::from_str(raw).unwrap();
    mount_statements(&server, json!([entry])).await;
    mount_invoice(&server, "205", json!([{ "id": 9 }])).await;

    Mock::given(method("POST"))
        .and(path(ITEM_UPDATE))
        .and(body_partial_json(json!({ "id": 9, "fields": { "paid": "1500.50" } })))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMENT_ADD))
        .respond_with(ok(json!(1)))
        .expect(1)
        .mount(&server)
        .await;

    let summary = job(&server, &dir)
        .run(&BankCredentials::new("X", "bank-token"), today())
        .await
        .unwrap();
    assert_eq!(summary.reconciled, 1);

    let requests = server.received_requests().await.unwrap();
    let comment = requests
        .iter()
        .find(|r| r.url.path() == COMMENT_ADD)
        .expect("comment request");
    let body: Value = serde_json::from_slice(&comment.body).unwrap();
    let text = body["fields"]["COMMENT"].as_str().unwrap();
    let reparsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(reparsed.to_string(), raw);
    assert!(text.starts_with("{\n    \"operationId\": \"op-7\",\n    \"fee\": 0,"));
}

#[tokio::test]
async fn already_paid_invoice_is_left_alone_across_runs() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(STATEMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operation": [payment("Счету №100 оплата", json!(500))]
        })))
        .expect(2)
        .mount(&server)
        .await;
    mount_invoice(&server, "100", json!([{ "id": 7, "paid": 500 }])).await;

    Mock::given(method("POST"))
        .and(path(ITEM_UPDATE))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMENT_ADD))
        .respond_with(ok(json!(1)))
        .expect(0)
        .mount(&server)
        .await;

    let mut job = job(&server, &dir);
    let credentials = BankCredentials::new("X", "bank-token");
    for _ in 0..2 {
        let summary = job.run(&credentials, today()).await.unwrap();
        assert_eq!(summary.already_paid, 1);
        assert_eq!(summary.reconciled, 0);
    }
}

#[tokio::test]
async fn skips_foreign_unnumbered_and_failed_statements() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut foreign = payment("Счету №1 оплата", json!(10));
    foreign["recipientAccount"] = json!("Y");
    mount_statements(
        &server,
        json!([
            foreign,
            payment("Перевод между счетами", json!(20)),
            payment("Оплата по счету №200 от 01.03", json!(30)),
            payment("Оплата по счету №300 от 02.03", json!(40)),
            payment("Оплата по счету №400 от 03.03", json!(50.25)),
        ]),
    )
    .await;

    // 200: lookup denied, 300: unknown invoice, 400: reconciled.
    Mock::given(method("POST"))
        .and(path(ITEM_LIST))
        .and(body_partial_json(json!({ "filter": { "accountNumber": "200" } })))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "ACCESS_DENIED",
            "error_description": "Access denied"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_invoice(&server, "300", json!([])).await;
    mount_invoice(&server, "400", json!([{ "id": "12", "paid": "" }])).await;

    Mock::given(method("POST"))
        .and(path(ITEM_UPDATE))
        .and(body_partial_json(json!({ "id": 12, "fields": { "paid": 50.25 } })))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMENT_ADD))
        .respond_with(ok(json!(1)))
        .expect(1)
        .mount(&server)
        .await;

    let summary = job(&server, &dir)
        .run(&BankCredentials::new("X", "bank-token"), today())
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            statements: 5,
            other_account: 1,
            no_invoice_number: 1,
            not_found: 1,
            already_paid: 0,
            failed: 1,
            reconciled: 1,
        }
    );
}

#[tokio::test]
async fn failed_update_adds_no_comment() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_invoice(&server, "100", json!([{ "id": 7 }])).await;

    Mock::given(method("POST"))
        .and(path(ITEM_UPDATE))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "BAD_REQUEST",
            "error_description": "Stage not found"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMENT_ADD))
        .respond_with(ok(json!(1)))
        .expect(0)
        .mount(&server)
        .await;

    let statement = serde_json::from_value(payment("Счету №100 оплата", json!(500))).unwrap();
    let outcome = job(&server, &dir).reconcile("X", &statement).await;
    assert_eq!(
        outcome,
        Outcome::UpdateFailed {
            invoice: "100".into(),
            id: remit_core::InvoiceId(7),
        }
    );
}

#[tokio::test]
async fn expired_crm_token_is_refreshed_mid_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_statements(&server, json!([payment("Счету №100 оплата", json!(500))])).await;

    Mock::given(method("POST"))
        .and(path(ITEM_LIST))
        .and(query_param("auth", "access"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "expired_token" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("auth", "access-2"))
        .and(path(ITEM_LIST))
        .respond_with(ok(json!({ "items": [{ "id": 7 }] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("auth", "access-2"))
        .and(path(ITEM_UPDATE))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("auth", "access-2"))
        .and(path(COMMENT_ADD))
        .respond_with(ok(json!(1)))
        .expect(1)
        .mount(&server)
        .await;

    let mut job = job(&server, &dir);
    let summary = job
        .run(&BankCredentials::new("X", "bank-token"), today())
        .await
        .unwrap();
    assert_eq!(summary.reconciled, 1);
    assert_eq!(job.crm().credentials().refresh_token, "refresh-2");
}

// =============================================================================
// Fatal paths
// =============================================================================

#[tokio::test]
async fn missing_bank_credentials_abort_before_any_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(STATEMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "operation": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let credentials = BankCredentials {
        account_number: Some("X".into()),
        auth_token: None,
    };
    let err = job(&server, &dir).run(&credentials, today()).await.unwrap_err();
    assert!(matches!(err, JobError::MissingCredentials));
}

#[tokio::test]
async fn bank_failure_ends_the_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(STATEMENTS))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errorMessage": "Unauthorized"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let err = job(&server, &dir)
        .run(&BankCredentials::new("X", "bank-token"), today())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Statements(ref e) if e.kind() == "api"));
}

// =============================================================================
// Wiring from configuration
// =============================================================================

#[tokio::test]
async fn run_wires_config_secrets_and_clients() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    std::fs::write(
        dir.path().join("bank.json"),
        r#"{"account_number":"X","auth_token":"bank-token"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("crm.json"),
        serde_json::to_string(&crm_credentials()).unwrap(),
    )
    .unwrap();

    mount_statements(&server, json!([payment("Счету №100 оплата", json!(500))])).await;
    mount_invoice(&server, "100", json!([{ "id": 7, "paid": 0 }])).await;
    Mock::given(method("POST"))
        .and(path(ITEM_UPDATE))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMENT_ADD))
        .respond_with(ok(json!(1)))
        .expect(1)
        .mount(&server)
        .await;

    let config = AppConfig::from_toml(&format!(
        r#"
        [secrets]
        bank_path = "{bank}"
        crm_path = "{crm}"

        [bank]
        base_url = "{uri}/openapi"

        [crm]
        api_base = "{uri}/rest"

        [invoice]
        paid_field = "paid"
        "#,
        bank = dir.path().join("bank.json").display(),
        crm = dir.path().join("crm.json").display(),
        uri = server.uri(),
    ))
    .unwrap();

    let summary = remit::run(config, today()).await.unwrap();
    assert_eq!(summary.reconciled, 1);
}

#[tokio::test]
async fn run_reports_missing_secrets() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::from_toml(&format!(
        "[secrets]\nbank_path = \"{}\"\n",
        dir.path().join("absent.json").display()
    ))
    .unwrap();

    let err = remit::run(config, today()).await.unwrap_err();
    assert!(format!("{err:#}").contains("bank credentials"));
}

#[tokio::test]
async fn blank_bank_credentials_win_over_missing_crm_secrets() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("bank.json"),
        r#"{"account_number":"","auth_token":"bank-token"}"#,
    )
    .unwrap();

    let config = AppConfig::from_toml(&format!(
        "[secrets]\nbank_path = \"{}\"\ncrm_path = \"{}\"\n",
        dir.path().join("bank.json").display(),
        dir.path().join("absent-crm.json").display(),
    ))
    .unwrap();

    let err = remit::run(config, today()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<JobError>(),
        Some(JobError::MissingCredentials)
    ));
}
