use actix_files::Files;
use actix_web::middleware::{Compress, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use dotenv::dotenv;
use std::io;
use std::sync::Arc;
use termine::auth::session::SessionRegistry;
use termine::auth::state::StateRegistry;
use termine::auth::GoogleTokenRefresher;
use termine::calendar::google::GoogleCalendarGateway;
use termine::calendar::CalendarGateway;
use termine::tokens::{Clock, CredentialManager, SystemClock, TokenStore};
use termine::web::{self, AppState};
use termine::AppConfig;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load().map_err(into_io_error)?;

    if config.server.template_autoreload {
        log::info!("template auto-reloading is enabled");
    } else {
        log::info!(
            "template auto-reloading is disabled; set server.template_autoreload to enable"
        );
    }

    let tokens = Arc::new(TokenStore::open(&config.store.path).map_err(into_io_error)?);
    let gateway: Arc<dyn CalendarGateway> =
        Arc::new(GoogleCalendarGateway::new().map_err(into_io_error)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let credentials = CredentialManager::new(
        tokens.clone(),
        Arc::new(GoogleTokenRefresher::new(config.google.clone())),
        clock.clone(),
    );

    let tmpl_reloader = Data::new(web::template_reloader(&config.server));
    let listen_addr = config.server.listen_addr;
    let static_dir = config.server.static_dir.clone();

    let state = Data::new(AppState {
        tokens,
        credentials,
        states: StateRegistry::new(),
        sessions: SessionRegistry::new(),
        gateway,
        clock,
        config,
    });

    log::info!("starting HTTP server at {}", listen_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(tmpl_reloader.clone())
            .configure(web::routes)
            .service(Files::new("/static", &static_dir))
            .wrap(web::error_handlers())
            .wrap(Compress::default())
            // Don't log things that could identify the user, e.g. omit client IP, referrer and
            // user agent.
            .wrap(Logger::new(r#""%r" %s %b %T"#))
    })
    .workers(2)
    .bind(listen_addr)?
    .run()
    .await
}

fn into_io_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}
