use std::future::{Future, pending};
use std::io::Write;
use std::pin::Pin;

use ai_panel_core::{
    EnvCredentialSource, HassConnector, Panel, PanelConfig, RenderOptions, SubmitOutcome,
    render_text,
};
use anyhow::{Context, Result, bail};
use hass_client::HassEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::Cli;

type InFlight = Pin<Box<dyn Future<Output = SubmitOutcome>>>;

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.panel_config(PanelConfig::from_env().context("invalid panel configuration")?);
    let credentials = cli.credential_source(EnvCredentialSource::from_env());
    let connector = HassConnector::new(config.connection_config());
    let options = cli.render_options();

    let mut panel = Panel::new(config);
    let mut events = panel.bootstrap(&credentials, &connector).await;

    match cli.once.as_deref() {
        Some(text) => run_once(&mut panel, &mut events, text, &cli, options).await,
        None => run_interactive(&mut panel, &mut events, options).await,
    }
}

async fn run_interactive(
    panel: &mut Panel,
    events: &mut Option<mpsc::Receiver<HassEvent>>,
    options: RenderOptions,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight: Option<InFlight> = None;
    redraw(panel, options)?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("stdin closed");
                    break;
                };
                if in_flight.is_some() || !panel.set_draft(line) {
                    debug!("ignoring input while a request is in flight");
                    continue;
                }
                match panel.begin_submit() {
                    Ok(submission) => in_flight = Some(Box::pin(submission.send())),
                    Err(rejection) => warn!(%rejection, "request not sent"),
                }
            }
            event = next_event(events), if events.is_some() => {
                match event {
                    Some(event) => {
                        panel.apply_event(&event);
                    }
                    None => {
                        warn!("event stream closed");
                        *events = None;
                    }
                }
            }
            outcome = settle(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                panel.finish_submit(&outcome);
            }
        }
        redraw(panel, options)?;
    }
    Ok(())
}

async fn run_once(
    panel: &mut Panel,
    events: &mut Option<mpsc::Receiver<HassEvent>>,
    text: &str,
    cli: &Cli,
    options: RenderOptions,
) -> Result<()> {
    panel.set_draft(text);
    let submission = match panel.begin_submit() {
        Ok(submission) => submission,
        Err(rejection) => {
            redraw(panel, options)?;
            bail!("request not sent: {rejection}");
        }
    };

    let send = submission.send();
    tokio::pin!(send);
    loop {
        tokio::select! {
            outcome = &mut send => {
                panel.finish_submit(&outcome);
                break;
            }
            event = next_event(events), if events.is_some() => {
                apply_or_close(panel, events, event);
            }
        }
    }

    // Tool events may trail the response.
    let deadline = tokio::time::sleep(cli.settle());
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = next_event(events), if events.is_some() => {
                apply_or_close(panel, events, event);
            }
        }
    }

    redraw(panel, options)
}

fn apply_or_close(
    panel: &mut Panel,
    events: &mut Option<mpsc::Receiver<HassEvent>>,
    event: Option<HassEvent>,
) {
    match event {
        Some(event) => {
            panel.apply_event(&event);
        }
        None => *events = None,
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<HassEvent>>) -> Option<HassEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn settle(in_flight: &mut Option<InFlight>) -> SubmitOutcome {
    match in_flight {
        Some(future) => future.await,
        None => pending().await,
    }
}

fn redraw(panel: &Panel, options: RenderOptions) -> Result<()> {
    let text = render_text(&panel.view(options));
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}").context("failed to write panel")?;
    stdout.flush().context("failed to flush stdout")
}
