//! Duplex voice call against a live audio endpoint.
//!
//! Opens a streaming session: microphone frames go up as base64 PCM, model
//! audio comes back and plays gaplessly, and the built-in `open_app`/
//! `send_sms` tools are brokered against the app directory.
//!
//! # Usage
//!
//! ```bash
//! export AURA_LIVE_ENDPOINT="wss://example.com/v1/live"
//! export AURA_API_KEY="your-api-key"
//! # optional: sample the primary monitor into the session at 1 Hz
//! export AURA_SCREEN_SHARE=1
//! cargo run --example voice_call
//! ```
//!
//! Hang up with Ctrl-C.

use anyhow::Context;
use aura_chat::{AppDirectoryBroker, builtin_tools};
use aura_voice::{
    CallConfig, LiveCall, PrimaryMonitor, ScreenShare, SessionSelector, SystemDevices, VoiceCall,
    WsConnector,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let endpoint = std::env::var("AURA_LIVE_ENDPOINT")
        .context("AURA_LIVE_ENDPOINT environment variable not set")?;
    let api_key =
        std::env::var("AURA_API_KEY").context("AURA_API_KEY environment variable not set")?;

    let config = CallConfig::new()
        .with_system_prompt("You are a friendly companion. Respond naturally and concisely.")
        .with_voice_profile("ember")
        .with_tools(builtin_tools());

    let call = Arc::new(LiveCall::new(
        config,
        Arc::new(WsConnector::from_endpoint(&endpoint, api_key)?),
        Arc::new(SystemDevices),
        Arc::new(AppDirectoryBroker),
    ));

    let selector = SessionSelector::new();
    selector.activate(Arc::clone(&call) as Arc<dyn VoiceCall>).await?;
    info!(session_id = ?call.session_id(), "Call open — speak away");

    let _share = match std::env::var("AURA_SCREEN_SHARE") {
        Ok(flag) if flag != "0" => {
            let feed = call.aux_feed().context("open session has no auxiliary feed")?;
            let share = ScreenShare::start(Arc::new(PrimaryMonitor), feed).await?;
            info!("Screen share attached");
            Some(share)
        }
        _ => None,
    };

    tokio::signal::ctrl_c().await?;
    info!("Hanging up");
    selector.end_call().await;
    Ok(())
}
