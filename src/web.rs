//! HTTP surface: application state, routes, handlers and page rendering.

pub mod forms;

use crate::auth::session::{SessionRegistry, SESSION_COOKIE};
use crate::auth::state::{StateRegistry, StateValidation};
use crate::auth::{self, AuthError, GoogleOAuthClient};
use crate::calendar::events::{self, EventFormValues, NormalizedEvent};
use crate::calendar::google::models::CalendarListEntry;
use crate::calendar::{self, CalendarGateway, EventQuery, GatewayError};
use crate::tokens::{Clock, CredentialManager, TokenStore};
use crate::{AppConfig, ServerConfig};
use actix_utils::future::{ready, Ready};
use actix_web::cookie::Cookie;
use actix_web::dev::{self, ServiceResponse};
use actix_web::http::header::ContentType;
use actix_web::http::{header, StatusCode};
use actix_web::middleware::{ErrorHandlerResponse, ErrorHandlers};
use actix_web::web::{Data, Form, Path, Query, ServiceConfig};
use actix_web::{
    error, route, Either, FromRequest, HttpRequest, HttpResponse, Responder, ResponseError, Result,
};
use actix_web_lab::respond::Html;
use chrono::Duration;
use forms::{DeleteForm, EventForm};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Shared state handed to every request handler.
pub struct AppState {
    pub config: AppConfig,
    pub tokens: Arc<TokenStore>,
    pub credentials: CredentialManager,
    pub states: StateRegistry,
    pub sessions: SessionRegistry,
    pub gateway: Arc<dyn CalendarGateway>,
    pub clock: Arc<dyn Clock>,
}

/// Registers all application routes.
pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(root)
        .service(login)
        .service(connect)
        .service(oauth_callback)
        .service(dashboard)
        .service(event_new_form)
        .service(event_create)
        .service(event_edit_form)
        .service(event_update)
        .service(event_delete)
        .service(settings)
        .service(logout);
}

/// Creates the template environment reloader.
pub fn template_reloader(config: &ServerConfig) -> AutoReloader {
    let template_dir = config.template_dir.clone();
    let autoreload = config.template_autoreload;

    // The closure is invoked every time the environment is outdated to recreate it.
    AutoReloader::new(move |notifier| {
        let mut env: minijinja::Environment<'static> = minijinja::Environment::new();

        // if watch_path is never called, no fs watcher is created
        if autoreload {
            notifier.watch_path(&template_dir, true);
        }

        env.set_source(minijinja::Source::from_path(&template_dir));

        Ok(env)
    })
}

pub struct MiniJinjaRenderer {
    tmpl_env: Data<AutoReloader>,
}

impl MiniJinjaRenderer {
    fn render(&self, tmpl: &str, ctx: impl Into<minijinja::value::Value>) -> Result<Html> {
        self.tmpl_env
            .acquire_env()
            .map_err(|_| error::ErrorInternalServerError("could not acquire template env"))?
            .get_template(tmpl)
            .map_err(|_| error::ErrorInternalServerError("could not find template"))?
            .render(ctx.into())
            .map(Html)
            .map_err(|err| {
                log::error!("{err}");
                error::ErrorInternalServerError("template error")
            })
    }
}

impl FromRequest for MiniJinjaRenderer {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut dev::Payload) -> Self::Future {
        let tmpl_env = <Data<AutoReloader>>::extract(req).into_inner().unwrap();

        ready(Ok(Self { tmpl_env }))
    }
}

/// The signed-in user, resolved from the session cookie. Extraction fails
/// with a redirect to the login page.
pub struct AuthedUser {
    pub user_id: String,
}

impl FromRequest for AuthedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut dev::Payload) -> Self::Future {
        let state = <Data<AppState>>::extract(req).into_inner().unwrap();

        let user = req
            .cookie(SESSION_COOKIE)
            .and_then(|cookie| state.sessions.user_for(cookie.value()));

        ready(match user {
            Some(user_id) => Ok(AuthedUser { user_id }),
            None => Err(SignInRequired.into()),
        })
    }
}

#[derive(Debug)]
struct SignInRequired;

impl fmt::Display for SignInRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sign-in required")
    }
}

impl ResponseError for SignInRequired {
    fn status_code(&self) -> StatusCode {
        StatusCode::SEE_OTHER
    }

    fn error_response(&self) -> HttpResponse {
        redirect_with("/login", "error", "Please connect your Google account first")
    }
}

/// Transient notice/error banner carried via query parameters.
#[derive(Deserialize)]
pub struct Banner {
    notice: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct EditParams {
    calendar_id: Option<String>,
    notice: Option<String>,
    error: Option<String>,
}

/// OAuth callback query parameters.
#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn redirect_to(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}

fn redirect_with(path: &str, param: &str, message: &str) -> HttpResponse {
    redirect_to(&format!("{path}?{param}={}", urlencoding::encode(message)))
}

fn failure(path: &str, err: &crate::Error) -> HttpResponse {
    redirect_with(path, "error", &err.to_string())
}

/// Produces a live access token for the user, refreshing the stored bundle
/// first when it is about to expire. No stored bundle means the calendar
/// service is unavailable.
async fn live_access_token(state: &AppState, user_id: &str) -> crate::Result<String> {
    state.credentials.ensure_fresh(user_id).await?;

    match state.tokens.get(user_id)? {
        Some(record) => Ok(record.access_token),
        None => Err(GatewayError::ServiceUnavailable.into()),
    }
}

async fn writable_calendars(
    state: &AppState,
    user_id: &str,
) -> crate::Result<Vec<CalendarListEntry>> {
    let access_token = live_access_token(state, user_id).await?;
    let entries = state.gateway.list_calendars(&access_token).await?;
    Ok(calendar::writable_calendars(entries))
}

#[route("/", method = "GET", method = "HEAD")]
async fn root() -> impl Responder {
    redirect_to("/login")
}

#[route("/login", method = "GET", method = "HEAD")]
async fn login(
    tmpl_env: MiniJinjaRenderer,
    state: Data<AppState>,
    banner: Query<Banner>,
) -> Result<Html> {
    tmpl_env.render(
        "login.html",
        minijinja::context! {
            site => state.config.site,
            notice => banner.notice,
            error => banner.error,
        },
    )
}

/// Starts the OAuth flow by redirecting to the provider's consent screen.
#[route("/auth/google/login", method = "GET")]
async fn connect(req: HttpRequest, state: Data<AppState>) -> impl Responder {
    match begin_connect(&req, &state) {
        Ok(authorize_url) => redirect_to(&authorize_url),
        Err(err) => {
            log::warn!("could not start the OAuth flow: {err}");
            failure("/login", &err)
        }
    }
}

fn begin_connect(req: &HttpRequest, state: &AppState) -> crate::Result<String> {
    let oauth = GoogleOAuthClient::from_config(&state.config.google)?;

    let info = req.connection_info();
    let redirect_uri = auth::callback_url(info.scheme(), info.host());

    let value = state.states.issue();
    Ok(oauth.authorize_url(&redirect_uri, &value))
}

/// Provider redirect target: validates the anti-forgery state, exchanges the
/// code and stores the credential bundle.
#[route("/auth/google/callback", method = "GET")]
async fn oauth_callback(
    req: HttpRequest,
    state: Data<AppState>,
    params: Query<CallbackParams>,
) -> impl Responder {
    match finish_connect(&req, &state, &params).await {
        Ok(session_id) => {
            let cookie = Cookie::build(SESSION_COOKIE, session_id)
                .path("/")
                .http_only(true)
                .finish();

            HttpResponse::SeeOther()
                .insert_header((
                    header::LOCATION,
                    format!(
                        "/dashboard?notice={}",
                        urlencoding::encode("Google Calendar connected")
                    ),
                ))
                .cookie(cookie)
                .finish()
        }
        Err(err) => {
            log::warn!("oauth callback failed: {err}");
            failure("/login", &err)
        }
    }
}

async fn finish_connect(
    req: &HttpRequest,
    state: &AppState,
    params: &CallbackParams,
) -> crate::Result<String> {
    if let Some(reason) = &params.error {
        return Err(AuthError::AuthorizationDenied(reason.clone()).into());
    }
    let Some(code) = params.code.as_deref() else {
        return Err(
            AuthError::AuthorizationDenied("the provider returned no authorization code".into())
                .into(),
        );
    };

    // The state is consumed here no matter how validation turns out.
    let known = params
        .state
        .as_deref()
        .map(|value| state.states.consume(value))
        .unwrap_or(false);

    if !known {
        match state.config.auth.state_validation {
            StateValidation::Strict => return Err(AuthError::StateMismatch.into()),
            StateValidation::Permissive => log::warn!(
                "proceeding without a matching anti-forgery state; permissive validation is meant for development"
            ),
        }
    }

    let oauth = GoogleOAuthClient::from_config(&state.config.google)?;
    let redirect_uri = {
        let info = req.connection_info();
        auth::callback_url(info.scheme(), info.host())
    };

    let tokens = oauth.exchange_code(code, &redirect_uri).await?;

    let now = state.clock.now();
    let expiry = match tokens.expires_in {
        Some(seconds) => now + Duration::seconds(seconds),
        None => now + Duration::hours(1),
    };

    let user_id = &state.config.auth.user_id;
    state.tokens.upsert(
        user_id,
        &tokens.access_token,
        tokens.refresh_token.as_deref(),
        expiry,
    )?;

    log::info!("google account connected for {user_id}");

    Ok(state.sessions.create(user_id))
}

#[route("/dashboard", method = "GET", method = "HEAD")]
async fn dashboard(
    tmpl_env: MiniJinjaRenderer,
    state: Data<AppState>,
    user: AuthedUser,
    banner: Query<Banner>,
) -> Result<Either<Html, HttpResponse>> {
    let (calendars, upcoming) = match load_dashboard(&state, &user.user_id).await {
        Ok(data) => data,
        Err(err) => {
            log::warn!("could not load the dashboard: {err}");
            return Ok(Either::Right(failure("/login", &err)));
        }
    };

    Ok(Either::Left(tmpl_env.render(
        "dashboard.html",
        minijinja::context! {
            site => state.config.site,
            authed => true,
            calendars => calendars,
            events => upcoming,
            notice => banner.notice,
            error => banner.error,
        },
    )?))
}

async fn load_dashboard(
    state: &AppState,
    user_id: &str,
) -> crate::Result<(Vec<CalendarListEntry>, Vec<NormalizedEvent>)> {
    let access_token = live_access_token(state, user_id).await?;

    let calendars =
        calendar::writable_calendars(state.gateway.list_calendars(&access_token).await?);

    let query = EventQuery {
        time_min: state.clock.now(),
        max_results: state.config.calendar.max_results,
    };
    let upcoming = state
        .gateway
        .list_events(&access_token, "primary", &query)
        .await?
        .into_iter()
        .map(events::normalize)
        .collect();

    Ok((calendars, upcoming))
}

#[route("/events/new", method = "GET", method = "HEAD")]
async fn event_new_form(
    tmpl_env: MiniJinjaRenderer,
    state: Data<AppState>,
    user: AuthedUser,
    banner: Query<Banner>,
) -> Result<Either<Html, HttpResponse>> {
    let calendars = match writable_calendars(&state, &user.user_id).await {
        Ok(calendars) => calendars,
        Err(err) => return Ok(Either::Right(failure("/dashboard", &err))),
    };

    Ok(Either::Left(tmpl_env.render(
        "event_form.html",
        minijinja::context! {
            site => state.config.site,
            authed => true,
            heading => "Create event",
            action => "/events/new",
            form => EventFormValues::default(),
            calendars => calendars,
            calendar_id => "",
            notice => banner.notice,
            error => banner.error,
        },
    )?))
}

#[route("/events/new", method = "POST")]
async fn event_create(
    state: Data<AppState>,
    user: AuthedUser,
    form: Form<EventForm>,
) -> impl Responder {
    match create_event(&state, &user.user_id, &form).await {
        Ok(()) => redirect_with("/dashboard", "notice", "Event created"),
        Err(err) => {
            log::warn!("event creation failed: {err}");
            failure("/events/new", &err)
        }
    }
}

async fn create_event(state: &AppState, user_id: &str, form: &EventForm) -> crate::Result<()> {
    // Validation happens before any network call.
    let validated = form.validate()?;

    let access_token = live_access_token(state, user_id).await?;
    let payload = validated.to_payload(state.config.calendar.time_zone.name());

    state
        .gateway
        .create_event(&access_token, &validated.calendar_id, &payload)
        .await?;

    Ok(())
}

#[route("/events/{event_id}/edit", method = "GET", method = "HEAD")]
async fn event_edit_form(
    tmpl_env: MiniJinjaRenderer,
    state: Data<AppState>,
    user: AuthedUser,
    path: Path<String>,
    params: Query<EditParams>,
) -> Result<Either<Html, HttpResponse>> {
    let event_id = path.into_inner();
    let calendar_id = params.calendar_id.as_deref().unwrap_or("primary");

    let form = match load_event_form(&state, &user.user_id, calendar_id, &event_id).await {
        Ok(form) => form,
        Err(err) => {
            log::warn!("could not load event {event_id}: {err}");
            return Ok(Either::Right(failure("/dashboard", &err)));
        }
    };

    Ok(Either::Left(tmpl_env.render(
        "event_form.html",
        minijinja::context! {
            site => state.config.site,
            authed => true,
            heading => "Edit event",
            action => format!("/events/{event_id}/edit"),
            form => form,
            calendars => Vec::<CalendarListEntry>::new(),
            calendar_id => calendar_id,
            notice => params.notice,
            error => params.error,
        },
    )?))
}

async fn load_event_form(
    state: &AppState,
    user_id: &str,
    calendar_id: &str,
    event_id: &str,
) -> crate::Result<EventFormValues> {
    let access_token = live_access_token(state, user_id).await?;
    let raw = state
        .gateway
        .get_event(&access_token, calendar_id, event_id)
        .await?;

    let normalized = events::normalize(raw);
    Ok(events::denormalize_for_form(
        &normalized,
        state.config.calendar.time_zone,
    ))
}

#[route("/events/{event_id}/edit", method = "POST")]
async fn event_update(
    state: Data<AppState>,
    user: AuthedUser,
    path: Path<String>,
    form: Form<EventForm>,
) -> impl Responder {
    let event_id = path.into_inner();

    match update_event(&state, &user.user_id, &event_id, &form).await {
        Ok(()) => redirect_with("/dashboard", "notice", "Event updated"),
        Err(err) => {
            log::warn!("event update failed: {err}");
            failure(&format!("/events/{event_id}/edit"), &err)
        }
    }
}

async fn update_event(
    state: &AppState,
    user_id: &str,
    event_id: &str,
    form: &EventForm,
) -> crate::Result<()> {
    let validated = form.validate()?;

    let access_token = live_access_token(state, user_id).await?;
    let payload = validated.to_payload(state.config.calendar.time_zone.name());

    state
        .gateway
        .update_event(&access_token, &validated.calendar_id, event_id, &payload)
        .await?;

    Ok(())
}

#[route("/events/delete", method = "POST")]
async fn event_delete(
    state: Data<AppState>,
    user: AuthedUser,
    form: Form<DeleteForm>,
) -> impl Responder {
    match delete_event(&state, &user.user_id, &form).await {
        Ok(()) => redirect_with("/dashboard", "notice", "Event deleted"),
        Err(err) => {
            log::warn!("event deletion failed: {err}");
            failure("/dashboard", &err)
        }
    }
}

async fn delete_event(state: &AppState, user_id: &str, form: &DeleteForm) -> crate::Result<()> {
    let access_token = live_access_token(state, user_id).await?;

    state
        .gateway
        .delete_event(&access_token, form.calendar_id(), &form.event_id)
        .await?;

    Ok(())
}

#[route("/settings", method = "GET", method = "HEAD")]
async fn settings(
    tmpl_env: MiniJinjaRenderer,
    state: Data<AppState>,
    user: AuthedUser,
    banner: Query<Banner>,
) -> Result<Html> {
    let record = state
        .tokens
        .get(&user.user_id)
        .map_err(error::ErrorInternalServerError)?;

    let expiry = record
        .as_ref()
        .map(|record| record.expiry.format("%Y-%m-%d %H:%M UTC").to_string());

    tmpl_env.render(
        "settings.html",
        minijinja::context! {
            site => state.config.site,
            authed => true,
            user_id => user.user_id,
            connected => record.is_some(),
            has_refresh_token => record.as_ref().map(|r| r.refresh_token.is_some()).unwrap_or(false),
            expiry => expiry,
            time_zone => state.config.calendar.time_zone.name(),
            notice => banner.notice,
            error => banner.error,
        },
    )
}

#[route("/logout", method = "POST")]
async fn logout(req: HttpRequest, state: Data<AppState>) -> impl Responder {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        state.sessions.destroy(cookie.value());
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.make_removal();

    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/login?notice=Signed%20out"))
        .cookie(removal)
        .finish()
}

/// Error handlers rendering templated 404/500 pages.
pub fn error_handlers<B: 'static>() -> ErrorHandlers<B> {
    ErrorHandlers::new()
        .handler(StatusCode::NOT_FOUND, not_found)
        .handler(StatusCode::INTERNAL_SERVER_ERROR, internal_server_error)
}

/// Error handler for a 404 Page not found error.
fn not_found<B>(svc_res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    error_handler(svc_res, "not_found.html")
}

/// Error handler for a 500 Internal server error.
fn internal_server_error<B>(svc_res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    error_handler(svc_res, "error.html")
}

/// Generic error handler.
fn error_handler<B>(svc_res: ServiceResponse<B>, tmpl: &str) -> Result<ErrorHandlerResponse<B>> {
    let req = svc_res.request();

    let reason = svc_res
        .status()
        .canonical_reason()
        .unwrap_or("Unknown error");
    let tmpl_env = MiniJinjaRenderer::extract(req).into_inner().unwrap();

    // Provide a fallback to a simple plain text response in case an error occurs during the
    // rendering of the error page.
    let fallback = |err: &str| {
        HttpResponse::build(svc_res.status())
            .content_type(ContentType::plaintext())
            .body(err.to_string())
    };

    let ctx = minijinja::context! {
        status_code => svc_res.status().as_str(),
        reason => reason,
    };

    let res = match tmpl_env.render(tmpl, ctx) {
        Ok(body) => body
            .customize()
            .with_status(svc_res.status())
            .respond_to(req)
            .map_into_boxed_body(),
        Err(_) => fallback(reason),
    };

    Ok(ErrorHandlerResponse::Response(ServiceResponse::new(
        svc_res.into_parts().0,
        res.map_into_right_body(),
    )))
}
