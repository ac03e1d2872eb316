#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<ServerInner>>,
    stream_tx: broadcast::Sender<StreamMessage>,
}

impl AppState {
    fn new() -> Self {
        let (stream_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Mutex::new(ServerInner::default())),
            stream_tx,
        }
    }
}

#[derive(Debug, Default)]
struct ServerInner {
    engine: Option<EngineApi>,
    emitted_event_count: usize,
}

/// Announcer that feeds the websocket stream. `broadcast::Sender::send` is a
/// non-blocking in-memory handoff; actual socket delivery happens on the
/// subscriber tasks, outside the engine lock.
struct BroadcastAnnouncer {
    campaign_id: String,
    stream_tx: broadcast::Sender<StreamMessage>,
}

impl Announcer for BroadcastAnnouncer {
    fn announce(&self, payload: &str, severity: SeverityTier) {
        let _ = self
            .stream_tx
            .send(StreamMessage::announcement(&self.campaign_id, payload, severity));
    }
}

fn require_campaign<'a>(
    inner: &'a ServerInner,
    campaign_id: &str,
) -> Result<&'a EngineApi, HttpApiError> {
    let Some(engine) = inner.engine.as_ref() else {
        return Err(HttpApiError::campaign_not_found(campaign_id, None));
    };

    if engine.campaign_id() != campaign_id {
        return Err(HttpApiError::campaign_not_found(
            campaign_id,
            Some(engine.campaign_id()),
        ));
    }

    Ok(engine)
}

fn require_campaign_mut<'a>(
    inner: &'a mut ServerInner,
    campaign_id: &str,
) -> Result<&'a mut EngineApi, HttpApiError> {
    let active_campaign_id = inner
        .engine
        .as_ref()
        .map(|engine| engine.campaign_id().to_string());
    let Some(engine) = inner.engine.as_mut() else {
        return Err(HttpApiError::campaign_not_found(campaign_id, None));
    };

    if engine.campaign_id() != campaign_id {
        return Err(HttpApiError::campaign_not_found(
            campaign_id,
            active_campaign_id.as_deref(),
        ));
    }

    Ok(engine)
}

/// Event records appended since the last collection, as stream messages.
fn collect_delta_messages(inner: &mut ServerInner, now: i64) -> Vec<StreamMessage> {
    let mut messages = Vec::new();

    let Some(engine) = inner.engine.as_ref() else {
        return messages;
    };

    let new_events = &engine.events()[inner.emitted_event_count..];
    for event in new_events {
        messages.push(StreamMessage::event_appended(event));
    }
    inner.emitted_event_count = engine.events().len();

    if let Some(last_error) = engine.last_persistence_error() {
        messages.push(StreamMessage::warning(
            engine.campaign_id(),
            now,
            last_error.to_string(),
        ));
    }

    messages
}

fn broadcast_messages(state: &AppState, messages: Vec<StreamMessage>) {
    for message in messages {
        let _ = state.stream_tx.send(message);
    }
}
