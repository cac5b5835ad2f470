use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use chrono::NaiveDate;
use roster_shared::{
    calendar::{by_selected_date, calendar_marks},
    dashboard::DashboardStats,
    navbar::PublicNavbar,
    roster::{assemble_preview, remove_reference},
    search::{self, KeyMatcher},
    sections::{self, SectionForm, SectionKind},
    store::{load_users, DocumentStore},
    sync::SyncOutcome,
    types::{keys, EmbeddedReference, RosterScope, EVENTS},
    users::{visible_users, UserFilter},
    value::{Fields, Value},
    AppState, RosterError,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// Fields searched by the roster member filter.
const MEMBER_SEARCH_KEYS: [&str; 5] = [
    keys::NAME,
    keys::FULL_NAME,
    keys::EMAIL,
    keys::SPECIALIZATION,
    keys::EDUCATION_HTML,
];

#[derive(Deserialize)]
struct TitleRequest {
    title: String,
}

#[derive(Deserialize)]
struct VisibilityRequest {
    visible: bool,
}

/// Main Lambda handler - routes user, roster, dashboard and site content endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("Roster API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let query = |name: &str| {
        event
            .query_string_parameters_ref()
            .and_then(|params| params.first(name))
            .unwrap_or("")
            .to_string()
    };
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, parts.as_slice()) {
        // GET /users?q=&role= - registry without super admins
        (&Method::GET, ["users"]) => {
            let filter = UserFilter {
                query: query("q"),
                role: query("role"),
            };
            list_users(&state, &filter).await
        }
        // GET /dashboard - account, department and role counts
        (&Method::GET, ["dashboard"]) => {
            json_response(StatusCode::OK, &DashboardStats::load(state.store.as_ref()).await)
        }
        (_, ["rosters", ..]) => match split_scope(&parts[1..]) {
            Some((scope, rest)) => route_roster(method, scope, rest, &query("q"), &state).await,
            None => not_found(),
        },
        // GET /navbar - departments and optional section links
        (&Method::GET, ["navbar"]) => json_response(StatusCode::OK, &PublicNavbar::load(state.store.as_ref()).await),
        // GET /events?date=YYYY-MM-DD - published events and calendar marks
        (&Method::GET, ["events"]) => list_events(&state, &query("date")).await,
        (_, ["sections", kind, rest @ ..]) => match SectionKind::parse(kind) {
            Some(kind) => route_section(method, kind, rest, event.body(), &state).await,
            None => not_found(),
        },
        _ => not_found(),
    }
}

/// Splits `college/...` or `departments/{id}/...` into a scope and the
/// remaining segments.
fn split_scope<'a>(parts: &'a [&'a str]) -> Option<(RosterScope, &'a [&'a str])> {
    match parts {
        ["college", rest @ ..] => Some((RosterScope::College, rest)),
        ["departments", id, rest @ ..] if !id.is_empty() => Some((RosterScope::Department(id.to_string()), rest)),
        _ => None,
    }
}

async fn route_roster(
    method: &Method,
    scope: RosterScope,
    rest: &[&str],
    q: &str,
    state: &AppState,
) -> Result<Response<Body>, Error> {
    match (method, rest) {
        // GET /rosters/{scope} - roster document
        (&Method::GET, []) => match state.store.read_once(&scope.path()).await {
            Ok(Some(doc)) => json_response(StatusCode::OK, &Value::Object(doc)),
            Ok(None) => error_response(StatusCode::NOT_FOUND, &format!("{} not found", scope)),
            Err(e) => roster_error(e),
        },
        // GET /rosters/{scope}/members?q= - leads and members matching the search
        (&Method::GET, ["members"]) => list_members(state, &scope, q).await,
        // GET /rosters/{scope}/members/{userId}/preview - detail view
        (&Method::GET, ["members", user_id, "preview"]) => preview_member(state, &scope, user_id).await,
        // DELETE /rosters/{scope}/members/{userId} - take a user off the roster
        (&Method::DELETE, ["members", user_id]) => {
            match remove_reference(state.store.as_ref(), &scope, user_id).await {
                Ok(Some(field)) => json_response(StatusCode::OK, &serde_json::json!({"removed": field})),
                Ok(None) => error_response(StatusCode::NOT_FOUND, "User is not on this roster"),
                Err(e) => roster_error(e),
            }
        }
        // POST /rosters/{scope}/sync - reconcile against the registry now
        (&Method::POST, ["sync"]) => {
            let users = match load_users(state.store.as_ref()).await {
                Ok(users) => users,
                Err(e) => return roster_error(e),
            };
            let body = match state.synchronizers.get(&scope).on_users_changed(&users).await {
                SyncOutcome::Written(fields) => serde_json::json!({"status": "written", "fields": fields}),
                SyncOutcome::Unchanged => serde_json::json!({"status": "unchanged"}),
                SyncOutcome::NotFound => serde_json::json!({"status": "not_found"}),
                // A cycle for this roster is already running on this container.
                SyncOutcome::Dropped => serde_json::json!({"status": "dropped"}),
                SyncOutcome::Failed => {
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Roster reconciliation failed")
                }
            };
            json_response(StatusCode::OK, &body)
        }
        _ => not_found(),
    }
}

async fn route_section(
    method: &Method,
    kind: SectionKind,
    rest: &[&str],
    body: &[u8],
    state: &AppState,
) -> Result<Response<Body>, Error> {
    let store = state.store.as_ref();
    match (method, rest) {
        // GET /sections/{kind}/extras - extra sections in page order
        (&Method::GET, ["extras"]) => match sections::extra_sections(store, kind).await {
            Ok(extras) => json_response(StatusCode::OK, &extras),
            Err(e) => roster_error(e),
        },
        // POST /sections/{kind}/ensure - create missing section documents
        (&Method::POST, ["ensure"]) => match sections::ensure_sections(store, kind).await {
            Ok(created) => json_response(StatusCode::OK, &serde_json::json!({"created": created})),
            Err(e) => roster_error(e),
        },
        (_, [id, ..]) if !kind.is_known(id) => not_found(),
        // GET /sections/{kind}/{id} - editor form and public visibility
        (&Method::GET, [id]) => match sections::load_section(store, kind, id).await {
            Ok(form) => json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "form": form,
                    "visible": sections::load_visibility(store, kind, id).await,
                    "hasVisibilityToggle": kind.has_visibility_toggle(id),
                }),
            ),
            Err(e) => roster_error(e),
        },
        // PUT /sections/{kind}/{id} - save cover, content and video
        (&Method::PUT, [id]) => {
            let form: SectionForm = match parse_body(body) {
                Ok(form) => form,
                Err(resp) => return resp,
            };
            match sections::save_section(store, kind, id, &form).await {
                Ok(()) => json_response(StatusCode::OK, &form),
                Err(e) => roster_error(e),
            }
        }
        // PUT /sections/{kind}/{id}/title - rename an existing section
        (&Method::PUT, [id, "title"]) => {
            let req: TitleRequest = match parse_body(body) {
                Ok(req) => req,
                Err(resp) => return resp,
            };
            match sections::save_title(store, kind, id, &req.title).await {
                Ok(()) => json_response(StatusCode::OK, &serde_json::json!({"title": req.title})),
                Err(e) => roster_error(e),
            }
        }
        // PUT /sections/{kind}/{id}/visibility - show or hide on the public site
        (&Method::PUT, [id, "visibility"]) => {
            let req: VisibilityRequest = match parse_body(body) {
                Ok(req) => req,
                Err(resp) => return resp,
            };
            match sections::save_visibility(store, kind, id, req.visible).await {
                Ok(()) => json_response(StatusCode::OK, &serde_json::json!({"visible": req.visible})),
                Err(e) => roster_error(e),
            }
        }
        _ => not_found(),
    }
}

async fn list_events(state: &AppState, date: &str) -> Result<Response<Body>, Error> {
    let day = match date {
        "" => None,
        text => match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            Ok(day) => Some(day),
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD"),
        },
    };

    let events: Vec<(String, Fields)> = match state.store.list(EVENTS).await {
        Ok(docs) => docs
            .into_iter()
            .filter(|(_, fields)| matches!(fields.get("published"), Some(Value::Bool(true))))
            .collect(),
        Err(e) => return roster_error(e),
    };

    let listed: Vec<Value> = by_selected_date(&events, day)
        .into_iter()
        .map(|(id, fields)| {
            let mut item = Fields::new();
            item.insert("id".to_string(), Value::from(id.as_str()));
            item.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(item)
        })
        .collect();
    json_response(
        StatusCode::OK,
        &serde_json::json!({"events": listed, "marks": calendar_marks(&events)}),
    )
}

async fn list_users(state: &AppState, filter: &UserFilter) -> Result<Response<Body>, Error> {
    let users = match load_users(state.store.as_ref()).await {
        Ok(users) => visible_users(&users),
        Err(e) => return roster_error(e),
    };
    json_response(StatusCode::OK, &filter.apply(&users))
}

async fn list_members(state: &AppState, scope: &RosterScope, q: &str) -> Result<Response<Body>, Error> {
    let doc = match state.store.read_once(&scope.path()).await {
        Ok(Some(doc)) => doc,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, &format!("{} not found", scope)),
        Err(e) => return roster_error(e),
    };

    let layout = scope.layout();
    let mut entries: Vec<Value> = layout
        .leads()
        .filter_map(|field| doc.get(field))
        .filter(|v| v.as_object().is_some())
        .cloned()
        .collect();
    for field in layout.members {
        if let Some(items) = doc.get(*field).and_then(Value::as_array) {
            entries.extend(items.iter().filter(|v| v.as_object().is_some()).cloned());
        }
    }

    let matcher = KeyMatcher::new(MEMBER_SEARCH_KEYS);
    let hits = search::filter(&entries, q, |item, query| matcher.matches(item, query));
    json_response(StatusCode::OK, &hits)
}

async fn preview_member(state: &AppState, scope: &RosterScope, user_id: &str) -> Result<Response<Body>, Error> {
    let doc = match state.store.read_once(&scope.path()).await {
        Ok(Some(doc)) => doc,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, &format!("{} not found", scope)),
        Err(e) => return roster_error(e),
    };

    let layout = scope.layout();
    let profile = layout
        .leads()
        .chain(layout.members.iter().copied())
        .filter_map(|field| doc.get(field))
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .filter_map(EmbeddedReference::from_value)
        .find(|r| r.identifier() == Some(user_id));
    let Some(profile) = profile else {
        return error_response(StatusCode::NOT_FOUND, "User is not on this roster");
    };

    let users = match load_users(state.store.as_ref()).await {
        Ok(users) => users,
        Err(e) => return roster_error(e),
    };
    let preview = assemble_preview(state.store.as_ref(), &profile, &users).await;
    json_response(StatusCode::OK, &preview)
}

/// Parses a JSON body, or answers 400.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Result<Response<Body>, Error>> {
    serde_json::from_slice(body).map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid body: {}", e)))
}

fn roster_error(e: RosterError) -> Result<Response<Body>, Error> {
    tracing::error!("Roster request failed: {}", e);
    let status = match e {
        RosterError::NotFound(_) => StatusCode::NOT_FOUND,
        RosterError::AbsentValue(_) | RosterError::Malformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RosterError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &e.to_string())
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

fn error_response(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    json_response(status, &serde_json::json!({"error": message}))
}

fn not_found() -> Result<Response<Body>, Error> {
    error_response(StatusCode::NOT_FOUND, "Not found")
}
