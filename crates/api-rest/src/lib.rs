//! # API REST
//!
//! REST API for the patient chart.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Chart rules live in `chart-core`; handlers translate between JSON and core types.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chart_core::{
    ChartContext, ChartError, CoreConfig, DoseSequence, DoseSummary, FileImmunizationStore,
    ImmunizationForm, ImmunizationService, Measurement, VaccineDoseGroup, VaccineOverviewRow,
    VitalsForm, VitalsHeaderState,
};
use chart_types::ResourceId;
use chrono::{NaiveDate, NaiveDateTime};
use fhir::VaccineCode;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    cfg: Arc<CoreConfig>,
    immunizations: ImmunizationService,
}

impl AppState {
    /// State backed by the file store under the configured chart data directory.
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        let store = Arc::new(FileImmunizationStore::from_config(&cfg));
        Self {
            immunizations: ImmunizationService::new(cfg.clone(), store),
            cfg,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_immunizations,
        immunization_overview,
        create_immunization,
        update_immunization,
        assess_vitals,
    ),
    components(schemas(
        HealthRes,
        DoseRes,
        VaccineGroupRes,
        SequenceRes,
        OverviewRowRes,
        ImmunizationReq,
        ImmunizationRes,
        VitalsAssessReq,
        VitalsAssessRes,
    ))
)]
struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/patients/:patient_id/immunizations",
            get(list_immunizations).post(create_immunization),
        )
        .route(
            "/patients/:patient_id/immunizations/overview",
            get(immunization_overview),
        )
        .route(
            "/patients/:patient_id/immunizations/:immunization_id",
            axum::routing::put(update_immunization),
        )
        .route("/vitals/assess", post(assess_vitals))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// One administered dose. Dates are `YYYY-MM-DD`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DoseRes {
    pub immunization_id: Option<String>,
    pub encounter_id: Option<String>,
    pub manufacturer: Option<String>,
    pub lot_number: Option<String>,
    pub sequence_label: Option<String>,
    pub dose_number: Option<u32>,
    pub administered_on: Option<String>,
    pub expires_on: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VaccineGroupRes {
    pub vaccine_display_name: Option<String>,
    pub vaccine_code: Option<String>,
    pub doses: Vec<DoseRes>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SequenceRes {
    pub label: String,
    pub number: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OverviewRowRes {
    pub vaccine_display_name: Option<String>,
    pub vaccine_code: Option<String>,
    pub sequences: Vec<SequenceRes>,
    pub doses: Vec<DoseRes>,
    pub last_administered_on: Option<String>,
}

/// A dose to create or update.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImmunizationReq {
    pub vaccine_code: String,
    pub vaccine_name: String,
    /// `YYYY-MM-DD`
    pub vaccination_date: String,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub sequence_label: Option<String>,
    #[serde(default)]
    pub dose_number: Option<u32>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub lot_number: Option<String>,
    /// Visit the dose is recorded against when the dose has no encounter yet.
    #[serde(default)]
    pub encounter_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImmunizationRes {
    pub immunization_id: String,
}

/// Vitals as entered on the form. Units: mmHg, beats/min, %, °C, kg, cm.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct VitalsAssessReq {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub pulse: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    /// `YYYY-MM-DDTHH:MM:SS`
    pub recorded_at: Option<String>,
    pub session_location: Option<String>,
    /// `YYYY-MM-DD`; defaults to the server's local date.
    pub today: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VitalsAssessRes {
    pub can_save: bool,
    pub out_of_range: Vec<String>,
    pub bmi: Option<f64>,
    pub header_state: String,
}

type ApiError = (StatusCode, String);

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    tracing::debug!(
        "health check, data dir {}",
        state.cfg.chart_data_dir().display()
    );
    Json(HealthRes {
        ok: true,
        message: "Chart REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}/immunizations",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Immunization history grouped by vaccine", body = [VaccineGroupRes]),
        (status = 400, description = "Invalid patient id"),
        (status = 500, description = "Internal server error")
    )
)]
/// Immunization history grouped by vaccine, doses in series order
#[axum::debug_handler]
async fn list_immunizations(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<VaccineGroupRes>>, ApiError> {
    let ctx = ChartContext::new(parse_id(&patient_id)?);
    let groups = state.immunizations.history(&ctx).map_err(to_api_error)?;
    Ok(Json(groups.into_iter().map(group_res).collect()))
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}/immunizations/overview",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "One row per vaccine with its configured sequences", body = [OverviewRowRes]),
        (status = 400, description = "Invalid patient id"),
        (status = 500, description = "Internal server error")
    )
)]
/// Per-vaccine overview joining configured vaccines with the patient's doses
#[axum::debug_handler]
async fn immunization_overview(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<OverviewRowRes>>, ApiError> {
    let ctx = ChartContext::new(parse_id(&patient_id)?);
    let rows = state.immunizations.overview(&ctx).map_err(to_api_error)?;
    Ok(Json(rows.into_iter().map(overview_res).collect()))
}

#[utoipa::path(
    post,
    path = "/patients/{patient_id}/immunizations",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    request_body = ImmunizationReq,
    responses(
        (status = 201, description = "Dose recorded", body = ImmunizationRes),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    )
)]
/// Record a new dose
///
/// # Errors
/// Returns `400 Bad Request` if an id, date or sequence is invalid or the dose fails
/// validation, and `500 Internal Server Error` if the store fails.
#[axum::debug_handler]
async fn create_immunization(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Json(req): Json<ImmunizationReq>,
) -> Result<(StatusCode, Json<ImmunizationRes>), ApiError> {
    let ctx = request_context(&patient_id, &req)?;
    let mut form = state.immunizations.new_form(VaccineCode {
        code: Some(req.vaccine_code.clone()),
        display: Some(req.vaccine_name.clone()),
    });
    apply_request(&mut form, req)?;

    let record_id = state
        .immunizations
        .submit(&ctx, &mut form)
        .map_err(to_api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(ImmunizationRes {
            immunization_id: record_id.to_string(),
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/patients/{patient_id}/immunizations/{immunization_id}",
    params(
        ("patient_id" = String, Path, description = "Patient identifier"),
        ("immunization_id" = String, Path, description = "Dose event identifier")
    ),
    request_body = ImmunizationReq,
    responses(
        (status = 200, description = "Dose updated", body = ImmunizationRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Dose not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Update an existing dose
///
/// The stored encounter is kept; `encounter_id` only applies to doses without one.
/// The vaccine of a dose event cannot change: `vaccine_code` and `vaccine_name` must match
/// the stored dose, otherwise the request is rejected with `400 Bad Request`.
#[axum::debug_handler]
async fn update_immunization(
    State(state): State<AppState>,
    Path((patient_id, immunization_id)): Path<(String, String)>,
    Json(req): Json<ImmunizationReq>,
) -> Result<Json<ImmunizationRes>, ApiError> {
    let ctx = request_context(&patient_id, &req)?;
    let record_id = parse_id(&immunization_id)?;

    let mut form = state
        .immunizations
        .edit_form(&ctx, &record_id)
        .map_err(to_api_error)?;
    ensure_same_vaccine(&form.entry().vaccine, &req)?;
    apply_request(&mut form, req)?;

    let saved = state
        .immunizations
        .submit(&ctx, &mut form)
        .map_err(to_api_error)?;
    Ok(Json(ImmunizationRes {
        immunization_id: saved.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/vitals/assess",
    request_body = VitalsAssessReq,
    responses(
        (status = 200, description = "Save readiness, range flags, BMI and header state", body = VitalsAssessRes),
        (status = 400, description = "Bad request")
    )
)]
/// Assess vitals as entered, without saving them
#[axum::debug_handler]
async fn assess_vitals(
    State(state): State<AppState>,
    Json(req): Json<VitalsAssessReq>,
) -> Result<Json<VitalsAssessRes>, ApiError> {
    let location = req.session_location.as_deref().map(parse_id).transpose()?;
    let today = match req.today.as_deref() {
        Some(text) => parse_date(text)?,
        None => chrono::Local::now().date_naive(),
    };

    let mut form = VitalsForm::new(location);
    let values = [
        (Measurement::Systolic, req.systolic),
        (Measurement::Diastolic, req.diastolic),
        (Measurement::Pulse, req.pulse),
        (Measurement::OxygenSaturation, req.oxygen_saturation),
        (Measurement::Temperature, req.temperature),
        (Measurement::Weight, req.weight),
        (Measurement::Height, req.height),
    ];
    for (measurement, value) in values {
        if value.is_some() {
            form.set(measurement, value).map_err(to_api_error)?;
        }
    }
    if let Some(text) = req.recorded_at.as_deref() {
        let recorded_at = text
            .parse::<NaiveDateTime>()
            .map_err(|e| bad_request(format!("invalid recorded_at '{text}': {e}")))?;
        form.set_recorded_at(recorded_at).map_err(to_api_error)?;
    }

    let assessment = form.assess(state.cfg.vitals_ranges(), today);
    Ok(Json(VitalsAssessRes {
        can_save: assessment.can_save,
        out_of_range: assessment
            .out_of_range
            .into_iter()
            .map(measurement_name)
            .map(str::to_string)
            .collect(),
        bmi: assessment.bmi,
        header_state: match assessment.header_state {
            VitalsHeaderState::Default => "default",
            VitalsHeaderState::Warning => "warning",
        }
        .to_string(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn to_api_error(err: ChartError) -> ApiError {
    match err {
        ChartError::InvalidInput(_)
        | ChartError::InvalidId(_)
        | ChartError::InvalidTransition { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        ChartError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        other => {
            tracing::error!("Chart error: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    }
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, message)
}

fn parse_id(value: &str) -> Result<ResourceId, ApiError> {
    ResourceId::parse(value).map_err(|e| bad_request(format!("invalid id '{value}': {e}")))
}

fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| bad_request(format!("invalid date '{value}': {e}")))
}

fn request_context(patient_id: &str, req: &ImmunizationReq) -> Result<ChartContext, ApiError> {
    let visit = req.encounter_id.as_deref().map(parse_id).transpose()?;
    Ok(ChartContext::new(parse_id(patient_id)?).with_active_visit(visit))
}

fn ensure_same_vaccine(stored: &VaccineCode, req: &ImmunizationReq) -> Result<(), ApiError> {
    let same_code = stored.code.as_deref() == Some(req.vaccine_code.as_str());
    let same_name = stored.display.as_deref() == Some(req.vaccine_name.as_str());
    if same_code && same_name {
        return Ok(());
    }
    Err(bad_request(format!(
        "vaccine of an existing dose cannot change (stored {}, requested {})",
        stored.code.as_deref().unwrap_or("<none>"),
        req.vaccine_code
    )))
}

/// Copy the request's dose values onto the form.
fn apply_request(form: &mut ImmunizationForm, req: ImmunizationReq) -> Result<(), ApiError> {
    let vaccination_date = parse_date(&req.vaccination_date)?;
    let expiration_date = req.expiration_date.as_deref().map(parse_date).transpose()?;

    let sequence = match req.dose_number {
        Some(number) => {
            let number = NonZeroU32::new(number)
                .ok_or_else(|| bad_request("dose_number must be positive".into()))?;
            Some(DoseSequence {
                label: req.sequence_label.unwrap_or_else(|| number.to_string()),
                number,
            })
        }
        None => None,
    };

    form.set_vaccination_date(Some(vaccination_date))
        .map_err(to_api_error)?;
    form.set_expiration_date(expiration_date)
        .map_err(to_api_error)?;
    form.set_manufacturer(req.manufacturer)
        .map_err(to_api_error)?;
    form.set_lot_number(req.lot_number).map_err(to_api_error)?;
    form.select_sequence(sequence).map_err(to_api_error)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn dose_res(dose: DoseSummary) -> DoseRes {
    DoseRes {
        immunization_id: dose.immunization_record_id,
        encounter_id: dose.encounter_id,
        manufacturer: dose.manufacturer,
        lot_number: dose.lot_number,
        sequence_label: dose.dose_sequence_label,
        dose_number: dose.dose_number.map(NonZeroU32::get),
        administered_on: dose.administered_on.map(format_date),
        expires_on: dose.expires_on.map(format_date),
    }
}

fn group_res(group: VaccineDoseGroup) -> VaccineGroupRes {
    VaccineGroupRes {
        vaccine_display_name: group.vaccine_display_name,
        vaccine_code: group.vaccine_code,
        doses: group.doses.into_iter().map(dose_res).collect(),
    }
}

fn overview_res(row: VaccineOverviewRow) -> OverviewRowRes {
    OverviewRowRes {
        vaccine_display_name: row.vaccine_display_name,
        vaccine_code: row.vaccine_code,
        sequences: row
            .sequences
            .into_iter()
            .map(|s| SequenceRes {
                label: s.label,
                number: s.number.get(),
            })
            .collect(),
        doses: row.doses.into_iter().map(dose_res).collect(),
        last_administered_on: row.last_administered_on.map(format_date),
    }
}

fn measurement_name(measurement: Measurement) -> &'static str {
    match measurement {
        Measurement::Systolic => "systolic",
        Measurement::Diastolic => "diastolic",
        Measurement::Pulse => "pulse",
        Measurement::OxygenSaturation => "oxygen_saturation",
        Measurement::Temperature => "temperature",
        Measurement::Weight => "weight",
        Measurement::Height => "height",
    }
}
