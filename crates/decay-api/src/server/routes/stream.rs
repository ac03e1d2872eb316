async fn stream_campaign(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, HttpApiError> {
    let initial_message = {
        let inner = state.inner.lock().await;
        let status = require_campaign(&inner, &campaign_id)?.status(wall_clock_now());
        StreamMessage::campaign_status(&status)
    };

    Ok(ws.on_upgrade(move |socket| stream_socket(socket, state, campaign_id, initial_message)))
}

async fn stream_socket(
    mut socket: WebSocket,
    state: AppState,
    campaign_id: String,
    initial_message: StreamMessage,
) {
    if send_stream_message(&mut socket, &initial_message)
        .await
        .is_err()
    {
        return;
    }

    let mut rx = state.stream_tx.subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break;
                    }
                    _ => {}
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Ok(message) => {
                        if message.campaign_id != campaign_id {
                            continue;
                        }

                        if send_stream_message(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        let warning = StreamMessage::warning(
                            &campaign_id,
                            0,
                            format!("stream client lagged and skipped {skipped} message(s)"),
                        );

                        if send_stream_message(&mut socket, &warning).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }
}

async fn send_stream_message(
    socket: &mut WebSocket,
    message: &StreamMessage,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

#[derive(Debug, Clone, Serialize)]
struct StreamMessage {
    schema_version: String,
    #[serde(rename = "type")]
    message_type: String,
    campaign_id: String,
    at: i64,
    payload: Value,
}

impl StreamMessage {
    fn campaign_status(status: &EngineStatus) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "campaign.status".to_string(),
            campaign_id: status.campaign_id.clone(),
            at: status.at,
            payload: json!(status),
        }
    }

    fn event_appended(event: &EventRecord) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "event.appended".to_string(),
            campaign_id: event.campaign_id.clone(),
            at: event.at,
            payload: json!(event),
        }
    }

    /// Outbound transmission for the audience, rendered and committed.
    fn announcement(campaign_id: &str, payload: &str, severity: SeverityTier) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "announcement".to_string(),
            campaign_id: campaign_id.to_string(),
            at: 0,
            payload: json!({ "payload": payload, "severity": severity }),
        }
    }

    fn warning(campaign_id: &str, at: i64, warning: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "warning".to_string(),
            campaign_id: campaign_id.to_string(),
            at,
            payload: json!({ "message": warning }),
        }
    }
}
