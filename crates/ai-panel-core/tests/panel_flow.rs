use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ai_panel_core::{
    Connector, ConnectionStatus, CredentialError, CredentialSource, ErrorSource, Panel,
    PanelConfig, PanelConnection, RenderOptions, StaticCredentialSource, SubmitOutcome,
    SubmitRejection,
};
use async_trait::async_trait;
use hass_client::{ClientError, HassAuth, HassEvent};
use serde_json::{Value, json};
use tokio::sync::mpsc;

type Reply = Result<Value, ClientError>;

#[derive(Default)]
struct FakeConnection {
    calls: Mutex<Vec<Value>>,
    replies: Mutex<VecDeque<Reply>>,
    subscribed: Mutex<Vec<String>>,
    sinks: Mutex<Vec<(String, mpsc::Sender<HassEvent>)>>,
    failing_subscription: Option<String>,
}

impl FakeConnection {
    fn replying(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<Value> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn subscribed(&self) -> Vec<String> {
        self.subscribed
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }

    /// Deliver an event the way the server does: only to subscribers of its type.
    fn push(&self, event_type: &str, data: Value) -> usize {
        let Ok(sinks) = self.sinks.lock() else {
            return 0;
        };
        sinks
            .iter()
            .filter(|(subscribed, _)| subscribed == event_type)
            .filter(|(_, sink)| sink.try_send(event(event_type, data.clone())).is_ok())
            .count()
    }
}

#[async_trait]
impl PanelConnection for FakeConnection {
    async fn subscribe(
        &self,
        event_type: &str,
        sink: mpsc::Sender<HassEvent>,
    ) -> Result<(), ClientError> {
        if self.failing_subscription.as_deref() == Some(event_type) {
            return Err(ClientError::Command {
                code: "unauthorized".to_string(),
                message: "Unauthorized".to_string(),
            });
        }
        if let Ok(mut names) = self.subscribed.lock() {
            names.push(event_type.to_string());
        }
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.push((event_type.to_string(), sink));
        }
        Ok(())
    }

    async fn call(&self, payload: Value) -> Result<Value, ClientError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(payload);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or(Err(ClientError::ConnectionClosed))
    }
}

struct FakeConnector {
    connection: Option<Arc<FakeConnection>>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _auth: HassAuth) -> Result<Arc<dyn PanelConnection>, ClientError> {
        match &self.connection {
            Some(connection) => Ok(Arc::clone(connection) as Arc<dyn PanelConnection>),
            None => Err(ClientError::Connection("connection refused".to_string())),
        }
    }
}

struct NoCredential;

#[async_trait]
impl CredentialSource for NoCredential {
    async fn credential(&self) -> Result<HassAuth, CredentialError> {
        Err(CredentialError::MissingUrl)
    }
}

fn credentials() -> anyhow::Result<StaticCredentialSource> {
    Ok(StaticCredentialSource::new(HassAuth::new(
        "http://homeassistant.local:8123",
        "token",
    )?))
}

fn event(event_type: &str, data: Value) -> HassEvent {
    HassEvent {
        event_type: event_type.to_string(),
        data,
        origin: None,
        time_fired: None,
    }
}

async fn connected_panel_with_events(
    connection: &Arc<FakeConnection>,
) -> anyhow::Result<(Panel, mpsc::Receiver<HassEvent>)> {
    let mut panel = Panel::new(PanelConfig::default());
    let connector = FakeConnector {
        connection: Some(Arc::clone(connection)),
    };
    let Some(events) = panel.bootstrap(&credentials()?, &connector).await else {
        anyhow::bail!("bootstrap returned no event stream");
    };
    Ok((panel, events))
}

async fn connected_panel(connection: &Arc<FakeConnection>) -> anyhow::Result<Panel> {
    Ok(connected_panel_with_events(connection).await?.0)
}

fn drain(panel: &mut Panel, events: &mut mpsc::Receiver<HassEvent>) -> usize {
    let mut applied = 0;
    while let Ok(event) = events.try_recv() {
        if panel.apply_event(&event).is_some() {
            applied += 1;
        }
    }
    applied
}

#[tokio::test]
async fn bootstrap_subscribes_to_both_events() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(Vec::new());
    let panel = connected_panel(&connection).await?;

    assert_eq!(panel.state().connection, ConnectionStatus::Ready);
    assert_eq!(
        connection.subscribed(),
        vec!["ha_ai_controller_action", "ha_ai_controller_error"]
    );
    Ok(())
}

#[tokio::test]
async fn bootstrap_runs_once() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(Vec::new());
    let mut panel = connected_panel(&connection).await?;
    let connector = FakeConnector {
        connection: Some(Arc::clone(&connection)),
    };

    assert!(panel.bootstrap(&credentials()?, &connector).await.is_none());
    assert_eq!(connection.subscribed().len(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_bootstrap_shows_banner_and_blocks_requests() {
    let mut panel = Panel::new(PanelConfig::default());
    let events = panel
        .bootstrap(&NoCredential, &FakeConnector { connection: None })
        .await;
    assert!(events.is_none());
    assert!(matches!(panel.state().connection, ConnectionStatus::Failed(_)));
    assert!(panel.state().errors.is_empty());

    let rejected = panel.submit("turn on kitchen light").await;
    assert_eq!(rejected, Err(SubmitRejection::NotConnected));
    assert_eq!(panel.state().submission.draft, "");
    assert!(!panel.state().submission.is_processing);

    let view = panel.view(RenderOptions::default());
    assert!(view.banner.is_some_and(|banner| banner.contains("HASS_URL")));
}

#[tokio::test]
async fn connect_failure_is_reported() -> anyhow::Result<()> {
    let mut panel = Panel::new(PanelConfig::default());
    let events = panel
        .bootstrap(&credentials()?, &FakeConnector { connection: None })
        .await;
    assert!(events.is_none());
    let ConnectionStatus::Failed(reason) = &panel.state().connection else {
        anyhow::bail!("unexpected status {:?}", panel.state().connection);
    };
    assert!(reason.contains("connection refused"));
    Ok(())
}

#[tokio::test]
async fn failed_subscription_degrades_but_keeps_requests() -> anyhow::Result<()> {
    let connection = Arc::new(FakeConnection {
        failing_subscription: Some("ha_ai_controller_error".to_string()),
        replies: Mutex::new(VecDeque::from([Ok(json!({"success": true}))])),
        ..FakeConnection::default()
    });
    let mut panel = connected_panel(&connection).await?;

    assert!(matches!(
        panel.state().connection,
        ConnectionStatus::Degraded(_)
    ));
    assert_eq!(connection.subscribed(), vec!["ha_ai_controller_action"]);

    let outcome = panel.submit("hello").await;
    assert_eq!(outcome, Ok(SubmitOutcome::Succeeded { response: None }));
    Ok(())
}

#[tokio::test]
async fn blank_input_never_reaches_the_backend() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(Vec::new());
    let mut panel = connected_panel(&connection).await?;

    assert!(panel.set_draft("kept"));
    for text in ["", "   ", "\n\t"] {
        assert_eq!(panel.submit(text).await, Err(SubmitRejection::EmptyInput));
        assert!(!panel.state().submission.is_processing);
        assert_eq!(panel.state().submission.draft, "kept");
    }
    assert!(connection.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn second_submit_while_processing_is_rejected() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(vec![Ok(json!({"success": true}))]);
    let mut panel = connected_panel(&connection).await?;

    assert!(panel.set_draft("first"));
    let pending = panel.begin_submit()?;
    assert!(panel.state().submission.is_processing);

    assert!(!panel.set_draft("second"));
    assert_eq!(
        panel.begin_submit().err(),
        Some(SubmitRejection::AlreadyProcessing)
    );
    assert_eq!(
        panel.submit("second").await,
        Err(SubmitRejection::AlreadyProcessing)
    );

    let outcome = pending.send().await;
    panel.finish_submit(&outcome);
    assert_eq!(connection.calls().len(), 1);
    assert!(!panel.state().submission.is_processing);
    Ok(())
}

#[tokio::test]
async fn backend_rejection_becomes_one_error_record() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(vec![
        Ok(json!({"success": false, "error": "X"})),
        Ok(json!({"success": false})),
    ]);
    let mut panel = connected_panel(&connection).await?;

    panel.submit("first").await?;
    panel.submit("second").await?;

    let errors: Vec<(&str, ErrorSource)> = panel
        .state()
        .errors
        .iter()
        .map(|record| (record.error.as_str(), record.source))
        .collect();
    assert_eq!(
        errors,
        vec![
            ("Unknown error", ErrorSource::Response),
            ("X", ErrorSource::Response),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn transport_failure_resets_submission() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(vec![Err(ClientError::Timeout(
        "request timeout after 60s".to_string(),
    ))]);
    let mut panel = connected_panel(&connection).await?;

    let outcome = panel.submit("turn on kitchen light").await?;
    assert!(matches!(outcome, SubmitOutcome::Failed { .. }));

    let state = panel.state();
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].source, ErrorSource::Transport);
    assert!(state.errors[0].error.contains("request timeout"));
    assert!(!state.submission.is_processing);
    assert!(state.submission.draft.is_empty());
    Ok(())
}

#[tokio::test]
async fn kitchen_light_round_trip() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(vec![Ok(json!({
        "success": true,
        "response": "The kitchen light is now on."
    }))]);
    let mut panel = connected_panel(&connection).await?;

    assert!(panel.set_draft("turn on kitchen light"));
    let pending = panel.begin_submit()?;
    let busy = panel.view(RenderOptions::default());
    assert_eq!(busy.submit.label, "Processing...");
    assert!(busy.input.disabled);

    // The backend pushes the tool invocation before answering.
    panel.apply_event(&event(
        "ha_ai_controller_action",
        json!({
            "tool": "light.turn_on",
            "input": {"entity_id": "light.kitchen"},
            "result": {"success": true}
        }),
    ));

    let outcome = pending.send().await;
    panel.finish_submit(&outcome);

    assert_eq!(
        connection.calls(),
        vec![json!({"type": "ai_controller/process_request", "input": "turn on kitchen light"})]
    );

    let view = panel.view(RenderOptions::default());
    assert_eq!(view.submit.label, "Send Request");
    assert!(!view.input.disabled);
    assert_eq!(view.input.value, "");
    assert_eq!(view.errors, None);
    assert_eq!(
        view.last_response.as_deref(),
        Some("The kitchen light is now on.")
    );
    assert_eq!(view.actions.len(), 1);
    assert_eq!(view.actions[0].tool, "light.turn_on");
    assert!(view.actions[0].input.contains("light.kitchen"));
    Ok(())
}

#[tokio::test]
async fn pushed_events_reach_the_panel_through_their_subscriptions() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(Vec::new());
    let (mut panel, mut events) = connected_panel_with_events(&connection).await?;

    let delivered = connection.push(
        "ha_ai_controller_action",
        json!({"tool": "light.turn_on", "input": {}, "result": {}}),
    );
    assert_eq!(delivered, 1);
    let delivered = connection.push(
        "ha_ai_controller_error",
        json!({"error": "model overloaded"}),
    );
    assert_eq!(delivered, 1);
    assert_eq!(
        connection.push("state_changed", json!({"entity_id": "light.kitchen"})),
        0
    );

    assert_eq!(drain(&mut panel, &mut events), 2);

    let state = panel.state();
    assert_eq!(state.actions.len(), 1);
    assert_eq!(state.actions[0].tool, "light.turn_on");
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].error, "model overloaded");
    assert_eq!(state.errors[0].source, ErrorSource::Event);
    Ok(())
}

#[tokio::test]
async fn each_pushed_error_event_adds_one_record_in_order() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(Vec::new());
    let (mut panel, mut events) = connected_panel_with_events(&connection).await?;

    for message in ["first", "second", "third"] {
        connection.push("ha_ai_controller_error", json!({"error": message}));
    }
    assert_eq!(drain(&mut panel, &mut events), 3);

    let messages: Vec<&str> = panel
        .state()
        .errors
        .iter()
        .map(|record| record.error.as_str())
        .collect();
    assert_eq!(messages, vec!["third", "second", "first"]);
    assert!(panel.state().actions.is_empty());
    Ok(())
}

#[tokio::test]
async fn content_block_reply_is_a_success() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(vec![Ok(json!({
        "success": true,
        "response": [{"type": "text", "text": "The kitchen light is now on."}]
    }))]);
    let mut panel = connected_panel(&connection).await?;

    let outcome = panel.submit("turn on kitchen light").await?;
    assert!(matches!(outcome, SubmitOutcome::Succeeded { .. }));
    assert!(panel.state().errors.is_empty());
    assert_eq!(
        panel.state().last_response.as_deref(),
        Some("The kitchen light is now on.")
    );
    Ok(())
}

#[tokio::test]
async fn custom_namespaces_flow_through() -> anyhow::Result<()> {
    let connection = FakeConnection::replying(vec![Ok(json!({"success": true}))]);
    let config = PanelConfig {
        event_namespace: "my_ai".to_string(),
        command_namespace: "my_ai".to_string(),
        ..PanelConfig::default()
    };
    let mut panel = Panel::new(config);
    let connector = FakeConnector {
        connection: Some(Arc::clone(&connection)),
    };
    panel.bootstrap(&credentials()?, &connector).await;
    panel.submit("hi").await?;

    assert_eq!(connection.subscribed(), vec!["my_ai_action", "my_ai_error"]);
    assert_eq!(connection.calls()[0]["type"], "my_ai/process_request");
    Ok(())
}
