use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    BankTransferGate, BankTransferState, ConfirmGate, ConfirmInput, EligibilityVerdict,
    EntryGate, FileStorage, FunnelRules, FunnelState, FunnelStateStore, IncomeBracket,
    IncomeModalView, KeyValueFunnelStore, ModalContext, ModalEffect, ModalEvent, ModalState,
    Money, NavigationParams, PaymentGateway, PaymentMethod, PaymentMethodGate, PaymentOutcome,
    PaymentSubmission, RawNavigationParams, StubGateway, bank_transfer_gate, confirm_gate,
    entry_gate, evaluate, income_modal_view, payment_method_gate, transition,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliIncomeBracket {
    Low,
    Medium,
    High,
}

impl From<CliIncomeBracket> for IncomeBracket {
    fn from(value: CliIncomeBracket) -> Self {
        match value {
            CliIncomeBracket::Low => IncomeBracket::Low,
            CliIncomeBracket::Medium => IncomeBracket::Medium,
            CliIncomeBracket::High => IncomeBracket::High,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiIncomeBracket {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM", alias = "mid")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl From<ApiIncomeBracket> for IncomeBracket {
    fn from(value: ApiIncomeBracket) -> Self {
        match value {
            ApiIncomeBracket::Low => IncomeBracket::Low,
            ApiIncomeBracket::Medium => IncomeBracket::Medium,
            ApiIncomeBracket::High => IncomeBracket::High,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "invest-funnel",
    about = "Regulated investment funnel: income-bracket eligibility and step gating"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log filter directive, e.g. debug or invest_funnel=trace"
    )]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the funnel decision API over HTTP.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[command(flatten)]
        rules: RulesArgs,
    },
    /// Evaluate one amount against an income bracket and print the verdict as JSON.
    Evaluate {
        #[arg(long, value_enum)]
        bracket: CliIncomeBracket,
        #[arg(long, help = "Investment amount, e.g. 12,000")]
        amount: String,
        #[command(flatten)]
        rules: RulesArgs,
    },
    /// Print the income bracket table as JSON.
    Brackets,
    /// Inspect or reset a persisted funnel record.
    State {
        #[arg(long, default_value = ".invest-funnel.json")]
        state_file: PathBuf,
        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
    Show,
    Clear,
    /// Merge navigation parameters into the record, as a step arriving with them would.
    Reconcile {
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        income_range: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RulesArgs {
    #[arg(
        long,
        default_value_t = 1_000,
        help = "Smallest actionable investment in whole currency units"
    )]
    pub minimum_investment: u64,
    #[arg(
        long,
        default_value_t = 8_000,
        help = "Amounts above this require an income declaration"
    )]
    pub income_modal_threshold: u64,
    #[arg(
        long,
        default_value_t = 15_000,
        help = "Amount already invested in the past 12 months"
    )]
    pub prior_invested: u64,
    #[arg(long, default_value_t = 3.0, help = "Card payment fee in percent")]
    pub fee_percent: f64,
}

impl Default for RulesArgs {
    fn default() -> Self {
        Self {
            minimum_investment: 1_000,
            income_modal_threshold: 8_000,
            prior_invested: 15_000,
            fee_percent: 3.0,
        }
    }
}

pub fn build_rules(args: &RulesArgs) -> Result<FunnelRules, String> {
    if args.minimum_investment == 0 {
        return Err("--minimum-investment must be > 0".to_string());
    }

    if args.income_modal_threshold < args.minimum_investment {
        return Err("--income-modal-threshold must be >= --minimum-investment".to_string());
    }

    if !args.fee_percent.is_finite() || !(0.0..=100.0).contains(&args.fee_percent) {
        return Err("--fee-percent must be between 0 and 100".to_string());
    }

    Ok(FunnelRules {
        minimum_investment: Money::from_units(args.minimum_investment),
        income_modal_threshold: Money::from_units(args.income_modal_threshold),
        prior_invested: Money::from_units(args.prior_invested),
        payment_fee_bps: (args.fee_percent * 100.0).round() as u32,
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), &self.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BracketResponse {
    id: IncomeBracket,
    income_label: &'static str,
    max_per_offer: Money,
    max_across_offers: Option<Money>,
    per_offer_qualifier: Option<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EligibilityPayload {
    bracket: Option<ApiIncomeBracket>,
    amount: Option<Money>,
    prior_invested: Option<Money>,
}

#[derive(Debug, Clone, Copy)]
struct EligibilityRequest {
    bracket: IncomeBracket,
    amount: Money,
    prior_invested: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EligibilityResponse {
    bracket: IncomeBracket,
    amount: Money,
    prior_invested: Money,
    #[serde(flatten)]
    verdict: EligibilityVerdict,
}

#[derive(Debug, Deserialize)]
#[serde(
    tag = "step",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
enum GatePayload {
    Entry {
        amount: Money,
        #[serde(default)]
        income_range: Option<IncomeBracket>,
    },
    Confirm {
        #[serde(default)]
        state: FunnelState,
        #[serde(default)]
        input: ConfirmInput,
    },
    PaymentMethod {
        #[serde(default)]
        selected: Option<PaymentMethod>,
        #[serde(default)]
        state: FunnelState,
    },
    BankTransfer {
        #[serde(default)]
        transfer: BankTransferState,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
enum GateResponse {
    Entry(EntryGate),
    Confirm(ConfirmGate),
    PaymentMethod(PaymentMethodGate),
    BankTransfer(BankTransferGate),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModalPayload {
    #[serde(default)]
    modal: ModalState,
    event: ModalEvent,
    #[serde(default)]
    amount: Option<Money>,
    #[serde(default)]
    prior_invested: Option<Money>,
    #[serde(default)]
    payment_complete: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModalResponse {
    modal: ModalState,
    effects: Vec<ModalEffect>,
    view: Option<IncomeModalView>,
}

#[derive(Debug, Deserialize)]
struct PaymentPayload {
    amount: Money,
}

#[derive(Debug, Serialize)]
struct PaymentResponse {
    #[serde(flatten)]
    submission: PaymentSubmission,
    outcome: PaymentOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NavigationResponse {
    #[serde(flatten)]
    params: NavigationParams,
    query: String,
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port, rules } => {
            let rules = build_rules(&rules)?;
            run_http_server(port, rules)
                .await
                .map_err(|e| format!("Server error: {e}"))
        }
        Command::Evaluate {
            bracket,
            amount,
            rules,
        } => {
            let rules = build_rules(&rules)?;
            let amount =
                Money::parse(&amount).ok_or_else(|| format!("--amount {amount:?} is not a number"))?;
            let response = eligibility_response(EligibilityRequest {
                bracket: bracket.into(),
                amount,
                prior_invested: rules.prior_invested,
            });
            print_json(&response)
        }
        Command::Brackets => print_json(&bracket_table()),
        Command::State { state_file, action } => {
            let mut store = KeyValueFunnelStore::new(FileStorage::open(state_file));
            let state = match action {
                StateAction::Show => store.get(),
                StateAction::Clear => {
                    store.clear().map_err(|e| e.to_string())?;
                    store.get()
                }
                StateAction::Reconcile {
                    amount,
                    income_range,
                } => {
                    let params = NavigationParams::parse(&RawNavigationParams {
                        amount,
                        income_range,
                    });
                    store.reconcile(&params).map_err(|e| e.to_string())?
                }
            };
            print_json(&state)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

pub fn router(rules: FunnelRules) -> Router {
    Router::new()
        .route("/api/brackets", get(brackets_handler))
        .route(
            "/api/eligibility",
            get(eligibility_get_handler).post(eligibility_post_handler),
        )
        .route("/api/gate", post(gate_handler))
        .route("/api/modal", post(modal_handler))
        .route("/api/payment", post(payment_handler))
        .route("/api/navigation", get(navigation_handler))
        .fallback(not_found_handler)
        .with_state(rules)
}

pub async fn run_http_server(port: u16, rules: FunnelRules) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "funnel API listening");
    info!("local access: http://127.0.0.1:{port}/api/brackets");

    axum::serve(listener, router(rules)).await
}

async fn not_found_handler() -> Response {
    ApiError::NotFound.into_response()
}

async fn brackets_handler() -> Response {
    json_response(StatusCode::OK, bracket_table())
}

async fn eligibility_get_handler(
    State(rules): State<FunnelRules>,
    Query(payload): Query<EligibilityPayload>,
) -> Result<Response, ApiError> {
    eligibility_handler_impl(&rules, payload)
}

async fn eligibility_post_handler(
    State(rules): State<FunnelRules>,
    Json(payload): Json<EligibilityPayload>,
) -> Result<Response, ApiError> {
    eligibility_handler_impl(&rules, payload)
}

fn eligibility_handler_impl(
    rules: &FunnelRules,
    payload: EligibilityPayload,
) -> Result<Response, ApiError> {
    let request = eligibility_request_from_payload(rules, payload).map_err(ApiError::BadRequest)?;
    Ok(json_response(StatusCode::OK, eligibility_response(request)))
}

async fn gate_handler(
    State(rules): State<FunnelRules>,
    Json(payload): Json<GatePayload>,
) -> Response {
    json_response(StatusCode::OK, gate_response(&rules, payload))
}

async fn modal_handler(
    State(rules): State<FunnelRules>,
    Json(payload): Json<ModalPayload>,
) -> Response {
    json_response(StatusCode::OK, modal_response(&rules, payload))
}

async fn payment_handler(
    State(rules): State<FunnelRules>,
    Json(payload): Json<PaymentPayload>,
) -> Result<Response, ApiError> {
    if !rules.meets_minimum(payload.amount) {
        return Err(ApiError::BadRequest(format!(
            "amount must be at least {}",
            rules.minimum_investment
        )));
    }
    let submission = PaymentSubmission::new(&rules, payload.amount);
    let outcome = StubGateway.submit(&submission);
    Ok(json_response(
        StatusCode::OK,
        PaymentResponse {
            submission,
            outcome,
        },
    ))
}

async fn navigation_handler(Query(raw): Query<RawNavigationParams>) -> Response {
    let params = NavigationParams::parse(&raw);
    json_response(
        StatusCode::OK,
        NavigationResponse {
            query: params.to_query(),
            params,
        },
    )
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn bracket_table() -> Vec<BracketResponse> {
    IncomeBracket::ALL
        .into_iter()
        .map(|bracket| {
            let limits = bracket.limits();
            BracketResponse {
                id: bracket,
                income_label: limits.income_label,
                max_per_offer: limits.max_per_offer,
                max_across_offers: limits.max_across_offers,
                per_offer_qualifier: limits.per_offer_qualifier,
            }
        })
        .collect()
}

fn eligibility_request_from_payload(
    rules: &FunnelRules,
    payload: EligibilityPayload,
) -> Result<EligibilityRequest, String> {
    let Some(bracket) = payload.bracket else {
        return Err("bracket is required (low, medium or high)".to_string());
    };
    let Some(amount) = payload.amount else {
        return Err("amount is required".to_string());
    };

    Ok(EligibilityRequest {
        bracket: bracket.into(),
        amount,
        prior_invested: payload.prior_invested.unwrap_or(rules.prior_invested),
    })
}

fn eligibility_response(request: EligibilityRequest) -> EligibilityResponse {
    EligibilityResponse {
        bracket: request.bracket,
        amount: request.amount,
        prior_invested: request.prior_invested,
        verdict: evaluate(request.bracket, request.amount, request.prior_invested),
    }
}

fn gate_response(rules: &FunnelRules, payload: GatePayload) -> GateResponse {
    match payload {
        GatePayload::Entry {
            amount,
            income_range,
        } => GateResponse::Entry(entry_gate(rules, amount, income_range)),
        GatePayload::Confirm { state, input } => {
            GateResponse::Confirm(confirm_gate(rules, &state, &input))
        }
        GatePayload::PaymentMethod { selected, state } => {
            GateResponse::PaymentMethod(payment_method_gate(selected, state.amount))
        }
        GatePayload::BankTransfer { transfer } => {
            GateResponse::BankTransfer(bank_transfer_gate(&transfer))
        }
    }
}

fn modal_response(rules: &FunnelRules, payload: ModalPayload) -> ModalResponse {
    let ctx = ModalContext {
        amount: payload.amount.unwrap_or(Money::ZERO),
        prior_invested: payload.prior_invested.unwrap_or(rules.prior_invested),
        payment_complete: payload.payment_complete,
    };
    let result = transition(payload.modal, payload.event, &ctx);
    ModalResponse {
        view: income_modal_view(&result.next, &ctx),
        modal: result.next,
        effects: result.effects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ViolatedRule;

    fn eligibility_from_json(json: &str) -> Result<EligibilityRequest, String> {
        let payload = serde_json::from_str::<EligibilityPayload>(json)
            .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
        eligibility_request_from_payload(&FunnelRules::default(), payload)
    }

    #[test]
    fn build_rules_defaults_match_regulated_offer() {
        let rules = build_rules(&RulesArgs::default()).expect("valid rules");
        assert_eq!(rules, FunnelRules::default());
    }

    #[test]
    fn build_rules_rejects_zero_minimum() {
        let args = RulesArgs {
            minimum_investment: 0,
            ..RulesArgs::default()
        };
        let err = build_rules(&args).expect_err("must reject zero minimum");
        assert!(err.contains("--minimum-investment"));
    }

    #[test]
    fn build_rules_rejects_threshold_below_minimum() {
        let args = RulesArgs {
            income_modal_threshold: 500,
            ..RulesArgs::default()
        };
        let err = build_rules(&args).expect_err("must reject threshold order");
        assert!(err.contains("--income-modal-threshold"));
    }

    #[test]
    fn build_rules_rejects_out_of_range_fee() {
        let args = RulesArgs {
            fee_percent: 120.0,
            ..RulesArgs::default()
        };
        let err = build_rules(&args).expect_err("must reject fee");
        assert!(err.contains("--fee-percent"));
    }

    #[test]
    fn cli_parses_evaluate_subcommand() {
        let cli = Cli::try_parse_from([
            "invest-funnel",
            "evaluate",
            "--bracket",
            "medium",
            "--amount",
            "12,000",
            "--prior-invested",
            "0",
        ])
        .expect("cli should parse");
        let Command::Evaluate {
            bracket,
            amount,
            rules,
        } = cli.command
        else {
            panic!("expected evaluate command");
        };
        assert_eq!(bracket, CliIncomeBracket::Medium);
        assert_eq!(amount, "12,000");
        assert_eq!(rules.prior_invested, 0);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn eligibility_payload_accepts_numbers_and_strings() {
        let request = eligibility_from_json(
            r#"{"bracket": "low", "amount": "11,625", "priorInvested": 15000}"#,
        )
        .expect("json should parse");
        assert_eq!(request.bracket, IncomeBracket::Low);
        assert_eq!(request.amount, Money::from_units(11_625));

        let response = eligibility_response(request);
        assert!(!response.verdict.valid);
        assert_eq!(
            response.verdict.violated_rule,
            Some(ViolatedRule::CrossOffer)
        );
    }

    #[test]
    fn eligibility_payload_defaults_prior_invested() {
        let request = eligibility_from_json(r#"{"bracket": "medium", "amount": 8000}"#)
            .expect("json should parse");
        assert_eq!(request.prior_invested, Money::from_units(15_000));
        assert!(eligibility_response(request).verdict.valid);
    }

    #[test]
    fn eligibility_payload_requires_bracket_and_amount() {
        let err = eligibility_from_json(r#"{"amount": 8000}"#).expect_err("missing bracket");
        assert!(err.contains("bracket"));
        let err = eligibility_from_json(r#"{"bracket": "High"}"#).expect_err("missing amount");
        assert!(err.contains("amount"));
    }

    #[test]
    fn eligibility_response_flattens_verdict() {
        let request = eligibility_from_json(r#"{"bracket": "low", "amount": 12000}"#)
            .expect("json should parse");
        let json = serde_json::to_string(&eligibility_response(request)).expect("serialize");
        assert!(json.contains("\"valid\":false"));
        assert!(json.contains("\"violatedRule\":\"per-offer\""));
        assert!(json.contains("\"priorInvested\":15000"));
    }

    #[test]
    fn gate_payload_dispatches_on_step() {
        let rules = FunnelRules::default();
        let payload: GatePayload =
            serde_json::from_str(r#"{"step": "entry", "amount": 8001}"#).expect("entry payload");
        let json = serde_json::to_string(&gate_response(&rules, payload)).expect("serialize");
        assert!(json.contains("\"step\":\"entry\""));
        assert!(json.contains("\"action\":\"declare-income\""));

        let payload: GatePayload = serde_json::from_str(
            r#"{
              "step": "confirm",
              "state": {"amount": 12000, "incomeRange": "medium"},
              "input": {
                "acknowledgements": {"riskDisclosureAccepted": true, "ownFundsConfirmed": true},
                "signaturePresent": true
              }
            }"#,
        )
        .expect("confirm payload");
        let json = serde_json::to_string(&gate_response(&rules, payload)).expect("serialize");
        assert!(json.contains("\"continueEnabled\":true"));

        let payload: GatePayload = serde_json::from_str(
            r#"{"step": "bank-transfer", "transfer": {"status": "confirmation-uploaded", "file": {"name": "r.pdf"}}}"#,
        )
        .expect("bank transfer payload");
        let json = serde_json::to_string(&gate_response(&rules, payload)).expect("serialize");
        assert!(json.contains("\"submitEnabled\":true"));
        assert!(json.contains("\"transferLaterEnabled\":false"));
    }

    #[test]
    fn modal_payload_runs_one_transition() {
        let rules = FunnelRules::default();
        let payload: ModalPayload = serde_json::from_str(
            r#"{
              "modal": {"state": "awaiting-bracket", "origin": "entry", "selected": null},
              "event": {"type": "select-bracket", "bracket": "low"},
              "amount": 12000
            }"#,
        )
        .expect("modal payload");
        let response = modal_response(&rules, payload);
        let view = response.view.expect("income modal still open");
        assert!(!view.submit_enabled);
        assert!(view.error.is_some());
        assert!(response.effects.is_empty());
    }

    #[test]
    fn modal_payload_defaults_to_closed_state() {
        let rules = FunnelRules::default();
        let payload: ModalPayload =
            serde_json::from_str(r#"{"event": {"type": "transfer-later"}}"#).expect("payload");
        let response = modal_response(&rules, payload);
        assert!(matches!(response.modal, ModalState::ConfirmingAbandon { .. }));
        assert!(response.view.is_none());
    }

    #[test]
    fn bracket_table_lists_brackets_in_order() {
        let json = serde_json::to_string(&bracket_table()).expect("serialize");
        let low = json.find("\"low\"").expect("low present");
        let high = json.find("\"high\"").expect("high present");
        assert!(low < high);
        assert!(json.contains("\"maxAcrossOffers\":null"));
    }

    #[test]
    fn api_error_maps_to_status() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        let response = ApiError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }
}
