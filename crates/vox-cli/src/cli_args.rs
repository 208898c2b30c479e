use std::time::Duration;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use vox_correlation::CorrelationConfig;
use vox_directline::{DirectLineClientConfig, DEFAULT_DIRECT_LINE_DOMAIN};
use vox_gateway::{VoiceBridgeConfig, DEFAULT_PROGRESS_PHRASE, DEFAULT_REPROMPT_PHRASE};

use crate::cli_types::{CliAggregationMode, CliAggregationWindow};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "vox-bridge",
    about = "Bridges voice-assistant requests to a Direct Line bot",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "VOX_BIND",
        default_value = "0.0.0.0:8080",
        help = "HTTP listen address for the voice platform endpoint"
    )]
    pub(crate) bind: String,

    #[arg(
        long = "bot-id",
        env = "VOX_BOT_ID",
        help = "Bot identifier; stream activities from any other sender are dropped"
    )]
    pub(crate) bot_id: String,

    #[arg(
        long = "direct-line-secret",
        env = "VOX_DIRECT_LINE_SECRET",
        hide_env_values = true,
        help = "Direct Line channel secret"
    )]
    pub(crate) direct_line_secret: String,

    #[arg(
        long = "direct-line-domain",
        env = "VOX_DIRECT_LINE_DOMAIN",
        default_value = DEFAULT_DIRECT_LINE_DOMAIN,
        help = "Direct Line base URL"
    )]
    pub(crate) direct_line_domain: String,

    #[arg(
        long = "aggregation-mode",
        env = "VOX_AGGREGATION_MODE",
        value_enum,
        default_value_t = CliAggregationMode::Aggregating,
        help = "Answer with the first bot reply (immediate) or collect multi-part replies (aggregating)"
    )]
    pub(crate) aggregation_mode: CliAggregationMode,

    #[arg(
        long = "aggregation-window",
        env = "VOX_AGGREGATION_WINDOW",
        value_enum,
        default_value_t = CliAggregationWindow::Fixed,
        help = "Arm the aggregation timer once on the first part (fixed) or on every part (sliding)"
    )]
    pub(crate) aggregation_window: CliAggregationWindow,

    #[arg(
        long = "aggregation-timeout-ms",
        env = "VOX_AGGREGATION_TIMEOUT_MS",
        default_value_t = 3_000,
        value_parser = parse_positive_u64,
        help = "How long buffered bot replies wait for their request before being dropped"
    )]
    pub(crate) aggregation_timeout_ms: u64,

    #[arg(
        long = "response-deadline-ms",
        env = "VOX_RESPONSE_DEADLINE_MS",
        default_value_t = 8_000,
        value_parser = parse_positive_u64,
        help = "How long a voice request waits for its bot reply"
    )]
    pub(crate) response_deadline_ms: u64,

    #[arg(
        long = "leave-session-open",
        env = "VOX_LEAVE_SESSION_OPEN",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Keep the voice session open when the bot gives no input hint"
    )]
    pub(crate) leave_session_open: bool,

    #[arg(
        long = "card-translation",
        env = "VOX_CARD_TRANSLATION",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Translate bot hero cards into voice-platform cards"
    )]
    pub(crate) card_translation: bool,

    #[arg(
        long = "reprompt-phrase",
        env = "VOX_REPROMPT_PHRASE",
        default_value = DEFAULT_REPROMPT_PHRASE,
        help = "Phrase spoken when the user does not follow up"
    )]
    pub(crate) reprompt_phrase: String,

    #[arg(
        long = "progressive-response",
        env = "VOX_PROGRESSIVE_RESPONSE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Push a progress notice to the voice platform for each accepted utterance"
    )]
    pub(crate) progressive_response: bool,

    #[arg(
        long = "progressive-response-phrase",
        env = "VOX_PROGRESSIVE_RESPONSE_PHRASE",
        default_value = DEFAULT_PROGRESS_PHRASE,
        help = "Spoken progress notice"
    )]
    pub(crate) progressive_response_phrase: String,

    #[arg(
        long,
        env = "VOX_LOCALE",
        default_value = "en-US",
        help = "Locale stamped on activities sent to the bot"
    )]
    pub(crate) locale: String,

    #[arg(
        long = "identity-hash-key",
        env = "VOX_IDENTITY_HASH_KEY",
        default_value = vox_core::DEFAULT_IDENTITY_HASH_KEY,
        hide_env_values = true,
        help = "HMAC key used to derive bot-facing user ids"
    )]
    pub(crate) identity_hash_key: String,
}

impl Cli {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.bot_id.trim().is_empty() {
            bail!("--bot-id must not be empty");
        }
        if self.direct_line_secret.trim().is_empty() {
            bail!("--direct-line-secret must not be empty");
        }
        if self.identity_hash_key.is_empty() {
            bail!("--identity-hash-key must not be empty");
        }
        if self.locale.trim().is_empty() {
            bail!("--locale must not be empty");
        }
        Ok(())
    }

    pub(crate) fn correlation_config(&self) -> CorrelationConfig {
        CorrelationConfig {
            mode: self.aggregation_mode.into(),
            window: self.aggregation_window.into(),
            aggregation_timeout: Duration::from_millis(self.aggregation_timeout_ms),
            leave_session_open_default: self.leave_session_open,
            enable_card_translation: self.card_translation,
        }
    }

    pub(crate) fn bridge_config(&self) -> VoiceBridgeConfig {
        VoiceBridgeConfig {
            response_deadline: Duration::from_millis(self.response_deadline_ms),
            reprompt_phrase: self.reprompt_phrase.clone(),
            locale: self.locale.trim().to_string(),
        }
    }

    pub(crate) fn direct_line_config(&self) -> DirectLineClientConfig {
        DirectLineClientConfig::new(&self.direct_line_domain, &self.direct_line_secret)
    }
}

#[cfg(test)]
mod tests {
    use vox_correlation::{AggregationMode, AggregationWindow};

    use super::*;

    fn parse(extra: &[&str]) -> Result<Cli, clap::Error> {
        let mut args = vec![
            "vox-bridge",
            "--bot-id",
            "weather-bot",
            "--direct-line-secret",
            "secret",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args)
    }

    #[test]
    fn unit_defaults_match_documented_configuration() {
        let cli = parse(&[]).expect("parse");
        cli.validate().expect("valid");
        assert_eq!(cli.bind, "0.0.0.0:8080");
        assert_eq!(cli.direct_line_domain, DEFAULT_DIRECT_LINE_DOMAIN);
        let correlation = cli.correlation_config();
        assert_eq!(correlation.mode, AggregationMode::Aggregating);
        assert_eq!(correlation.window, AggregationWindow::Fixed);
        assert_eq!(correlation.aggregation_timeout, Duration::from_millis(3_000));
        assert!(!correlation.leave_session_open_default);
        assert!(!correlation.enable_card_translation);
        let bridge = cli.bridge_config();
        assert_eq!(bridge.response_deadline, Duration::from_millis(8_000));
        assert_eq!(bridge.reprompt_phrase, DEFAULT_REPROMPT_PHRASE);
        assert_eq!(bridge.locale, "en-US");
        assert!(!cli.progressive_response);
        assert_eq!(cli.progressive_response_phrase, "Working on it");
    }

    #[test]
    fn functional_flags_override_defaults() {
        let cli = parse(&[
            "--aggregation-mode",
            "immediate",
            "--aggregation-window",
            "sliding",
            "--aggregation-timeout-ms",
            "1200",
            "--leave-session-open",
            "--card-translation=true",
            "--locale",
            "de-DE",
        ])
        .expect("parse");
        let correlation = cli.correlation_config();
        assert_eq!(correlation.mode, AggregationMode::Immediate);
        assert_eq!(correlation.window, AggregationWindow::Sliding);
        assert_eq!(correlation.aggregation_timeout, Duration::from_millis(1_200));
        assert!(correlation.leave_session_open_default);
        assert!(correlation.enable_card_translation);
        assert_eq!(cli.bridge_config().locale, "de-DE");
    }

    #[test]
    fn regression_zero_timeouts_are_rejected() {
        assert!(parse(&["--aggregation-timeout-ms", "0"]).is_err());
        assert!(parse(&["--response-deadline-ms", "0"]).is_err());
    }

    #[test]
    fn regression_blank_bot_id_fails_validation() {
        let cli = Cli::try_parse_from([
            "vox-bridge",
            "--bot-id",
            "  ",
            "--direct-line-secret",
            "secret",
        ])
        .expect("parse");
        let error = cli.validate().expect_err("blank bot id");
        assert!(error.to_string().contains("--bot-id"));
    }
}
