//! `riftlink watch`: run the monitor until Ctrl-C.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use riftlink_api::{EventRouter, SubscriptionManager};
use riftlink_config::Config;
use riftlink_core::{MonitorEvent, WebsocketHandlerBridge};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::commands::util::build_session;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &WatchArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let session = build_session(cfg, true)?;
    let color = output::should_color(global.color);

    let manager = SubscriptionManager::new(
        Arc::clone(&session.league),
        Arc::new(EventRouter::new()),
        session.monitor_config.websocket(),
    );
    let bridge = WebsocketHandlerBridge::new(manager.clone(), session.accounts.clone());

    let mut events = session.emitter.subscribe();
    bridge.spawn(session.emitter.subscribe());
    manager.start();
    session.monitor.start();
    info!("watching client; press Ctrl-C to stop");

    let result = loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(e) = print_event(&event, args.json, color) {
                        break Err(e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    session.monitor.stop();
    bridge.stop();
    manager.stop().await;
    info!("stopped");
    result
}

fn print_event(event: &MonitorEvent, json: bool, color: bool) -> Result<(), CliError> {
    let now = Local::now();
    let line = if json {
        output::event_json(event, now)?
    } else {
        output::event_line(event, now, color)
    };
    output::print_line(&line);
    Ok(())
}
