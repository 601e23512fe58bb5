use std::path::PathBuf;
use std::time::Duration;

use ai_panel_core::config::{parse_history_limit, parse_namespace};
use ai_panel_core::{EnvCredentialSource, PanelConfig, RenderOptions};
use chrono::{Local, Offset, Utc};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ai-panel")]
#[command(about = "Home Assistant AI controller panel")]
pub struct Cli {
    /// Home Assistant URL (http, https, ws or wss). Overrides HASS_URL.
    #[arg(long)]
    pub url: Option<String>,

    /// File holding a long-lived access token. Overrides HASS_TOKEN and HASS_TOKEN_FILE.
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Prefix of the pushed event names.
    #[arg(long, value_parser = parse_namespace)]
    pub event_namespace: Option<String>,

    /// Prefix of the request command type.
    #[arg(long, value_parser = parse_namespace)]
    pub command_namespace: Option<String>,

    /// Keep at most this many actions and errors.
    #[arg(long, value_parser = parse_history_limit)]
    pub history_limit: Option<usize>,

    /// Show timestamps in UTC instead of local time.
    #[arg(long)]
    pub utc: bool,

    /// Send one request, print the panel and exit.
    #[arg(long, value_name = "TEXT")]
    pub once: Option<String>,

    /// With --once, how long to keep collecting events after the response.
    #[arg(long, default_value_t = 1500)]
    pub settle_ms: u64,
}

impl Cli {
    pub fn panel_config(&self, mut config: PanelConfig) -> PanelConfig {
        if let Some(namespace) = &self.event_namespace {
            config.event_namespace.clone_from(namespace);
        }
        if let Some(namespace) = &self.command_namespace {
            config.command_namespace.clone_from(namespace);
        }
        if self.history_limit.is_some() {
            config.history_limit = self.history_limit;
        }
        config
    }

    pub fn credential_source(&self, mut source: EnvCredentialSource) -> EnvCredentialSource {
        if let Some(url) = &self.url {
            source.url = Some(url.clone());
        }
        if let Some(path) = &self.token_file {
            source.token = None;
            source.token_file = Some(path.clone());
        }
        source
    }

    pub fn render_options(&self) -> RenderOptions {
        let utc_offset = if self.utc {
            Utc.fix()
        } else {
            Local::now().offset().fix()
        };
        RenderOptions { utc_offset }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ai-panel").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_leave_environment_untouched() -> anyhow::Result<()> {
        let cli = parse(&[])?;
        assert_eq!(cli.panel_config(PanelConfig::default()), PanelConfig::default());
        assert_eq!(cli.settle(), Duration::from_millis(1500));
        assert!(cli.once.is_none());

        let env = EnvCredentialSource {
            url: Some("http://ha.local:8123".to_string()),
            token: Some("abc".to_string()),
            token_file: None,
        };
        let merged = cli.credential_source(env.clone());
        assert_eq!(merged.url, env.url);
        assert_eq!(merged.token, env.token);
        Ok(())
    }

    #[test]
    fn flags_override_environment() -> anyhow::Result<()> {
        let cli = parse(&[
            "--url",
            "https://ha.example.com",
            "--token-file",
            "/run/secrets/ha",
            "--event-namespace",
            "my_ai",
            "--command-namespace",
            "my_ai",
            "--history-limit",
            "20",
            "--once",
            "turn on kitchen light",
        ])?;

        let config = cli.panel_config(PanelConfig::default());
        assert_eq!(config.action_event(), "my_ai_action");
        assert_eq!(config.process_request_type(), "my_ai/process_request");
        assert_eq!(config.history_limit, Some(20));

        let source = cli.credential_source(EnvCredentialSource {
            url: Some("http://ignored:8123".to_string()),
            token: Some("env-token".to_string()),
            token_file: None,
        });
        assert_eq!(source.url.as_deref(), Some("https://ha.example.com"));
        assert_eq!(source.token, None);
        assert_eq!(source.token_file, Some(PathBuf::from("/run/secrets/ha")));
        assert_eq!(cli.once.as_deref(), Some("turn on kitchen light"));
        Ok(())
    }

    #[test]
    fn utc_flag_pins_offset() -> anyhow::Result<()> {
        let cli = parse(&["--utc"])?;
        assert_eq!(cli.render_options().utc_offset, Utc.fix());
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        for args in [
            &["--history-limit", "0"][..],
            &["--event-namespace", "bad name"][..],
            &["--settle-ms", "soon"][..],
        ] {
            let kind = parse(args).err().map(|err| err.kind());
            assert_eq!(kind, Some(ErrorKind::ValueValidation), "{args:?}");
        }
    }
}
