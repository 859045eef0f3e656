use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Session;
use crate::api::ApiServer;

/// Run the HTTP API until Ctrl+C.
pub fn run_serve(session: Session, port: Option<u16>) -> Result<()> {
    let Session { config, db, notifier, .. } = session;
    let db_path = config.database_path()?;
    // The server opens its own connection per request
    drop(db);

    let port = port.unwrap_or(config.server.port);
    let server = ApiServer::new(config.server.host.clone(), port, db_path, notifier)?;

    println!("leadbook API listening on http://{}:{}", config.server.host, port);
    println!("Press Ctrl+C to stop.");

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc_handler(shutdown.clone());
    server.start(shutdown)
}

fn ctrlc_handler(shutdown: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        println!("\nShutting down...");
        shutdown.store(true, Ordering::SeqCst);
    });
}
