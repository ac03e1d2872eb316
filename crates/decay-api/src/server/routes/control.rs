#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateCampaignRequest {
    Config(CampaignConfig),
    WithOptions(CreateCampaignOptions),
}

#[derive(Debug, Deserialize)]
struct CreateCampaignOptions {
    config: CampaignConfig,
    sqlite_path: Option<String>,
    replace_existing: Option<bool>,
    resume_from_snapshot: Option<bool>,
    now: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CreateCampaignResponse {
    schema_version: String,
    campaign_id: String,
    status: EngineStatus,
    replaced_existing_campaign: bool,
    resumed_from_snapshot: bool,
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<Json<CreateCampaignResponse>, HttpApiError> {
    let (config, sqlite_path, replace_existing, resume_from_snapshot, now) = match request {
        CreateCampaignRequest::Config(config) => {
            (config, Some(default_sqlite_path()), true, false, None)
        }
        CreateCampaignRequest::WithOptions(options) => (
            options.config,
            Some(
                options
                    .sqlite_path
                    .filter(|path| !path.trim().is_empty())
                    .unwrap_or_else(default_sqlite_path),
            ),
            options.replace_existing.unwrap_or(true),
            options.resume_from_snapshot.unwrap_or(false),
            options.now,
        ),
    };
    let now = now.unwrap_or_else(wall_clock_now);

    let (response, messages) = {
        let mut inner = state.inner.lock().await;
        let replaced_existing_campaign = inner.engine.is_some();

        let mut engine =
            EngineApi::from_config(config).map_err(HttpApiError::from_schedule_config)?;
        engine.set_announcer(Arc::new(BroadcastAnnouncer {
            campaign_id: engine.campaign_id().to_string(),
            stream_tx: state.stream_tx.clone(),
        }));

        let mut resumed = false;
        if let Some(path) = sqlite_path {
            engine
                .attach_sqlite_store(path)
                .map_err(HttpApiError::from_persistence)?;
            if resume_from_snapshot {
                resumed = engine
                    .resume_from_store()
                    .map_err(HttpApiError::from_persistence)?;
            }
            if !resumed {
                engine
                    .initialize_campaign_storage(now, replace_existing)
                    .map_err(HttpApiError::from_persistence)?;
            }
        }

        let status = engine.status(now);
        inner.engine = Some(engine);
        inner.emitted_event_count = 0;

        let mut messages = collect_delta_messages(&mut inner, now);
        if replaced_existing_campaign {
            messages.push(StreamMessage::warning(
                &status.campaign_id,
                now,
                "existing campaign state was replaced by POST /campaigns".to_string(),
            ));
        }
        messages.push(StreamMessage::campaign_status(&status));

        (
            CreateCampaignResponse {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                campaign_id: status.campaign_id.clone(),
                status,
                replaced_existing_campaign,
                resumed_from_snapshot: resumed,
            },
            messages,
        )
    };

    broadcast_messages(&state, messages);

    Ok(Json(response))
}

#[derive(Debug, Deserialize, Default)]
struct TickRequest {
    now: Option<i64>,
    recent_message_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct TickResponse {
    schema_version: String,
    campaign_id: String,
    status: EngineStatus,
    campaign_day: Option<u32>,
    drift_raised_to: Option<f64>,
    announcements: Vec<AnnouncementBody>,
    expired_challenges: Vec<ChallengeOutcome>,
}

#[derive(Debug, Serialize)]
struct AnnouncementBody {
    payload: String,
    severity: SeverityTier,
}

async fn tick_campaign(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<TickRequest>,
) -> Result<Json<TickResponse>, HttpApiError> {
    let now = request.now.unwrap_or_else(wall_clock_now);
    let context = ChannelContext {
        recent_message_count: request.recent_message_count.unwrap_or(0),
    };

    let (response, messages) = {
        let mut inner = state.inner.lock().await;
        let (report, status) = {
            let engine = require_campaign_mut(&mut inner, &campaign_id)?;
            let report = engine.tick(now, &context);
            (report, engine.status(now))
        };

        let mut messages = collect_delta_messages(&mut inner, now);
        messages.push(StreamMessage::campaign_status(&status));

        (
            TickResponse {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                campaign_id: status.campaign_id.clone(),
                status,
                campaign_day: report.campaign_day,
                drift_raised_to: report.drift_raised_to,
                announcements: report
                    .announcements
                    .iter()
                    .map(|announcement| AnnouncementBody {
                        payload: announcement.payload.clone(),
                        severity: announcement.severity,
                    })
                    .collect(),
                expired_challenges: report.expired_challenges,
            },
            messages,
        )
    };

    broadcast_messages(&state, messages);

    Ok(Json(response))
}

#[derive(Debug, Deserialize, Default)]
struct ChallengeRequest {
    kind: Option<String>,
    source: Option<String>,
    now: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ChallengeResponse {
    schema_version: String,
    campaign_id: String,
    challenge: ChallengeDescriptor,
}

async fn request_challenge(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, HttpApiError> {
    let kind = match request.kind.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(ChallengeKind::parse(raw).ok_or_else(|| {
            HttpApiError::invalid_command(
                "unknown challenge kind",
                Some(format!(
                    "kind={raw} expected one of memory|circuit|static|debug|binary"
                )),
            )
        })?),
    };
    let now = request.now.unwrap_or_else(wall_clock_now);
    let source = request.source.unwrap_or_else(|| "observer:anonymous".to_string());

    let (response, messages) = {
        let mut inner = state.inner.lock().await;
        let (descriptor, campaign_id) = {
            let engine = require_campaign_mut(&mut inner, &campaign_id)?;
            (
                engine.request_challenge(kind, now, &source),
                engine.campaign_id().to_string(),
            )
        };

        let messages = collect_delta_messages(&mut inner, now);
        (
            ChallengeResponse {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                campaign_id,
                challenge: descriptor,
            },
            messages,
        )
    };

    broadcast_messages(&state, messages);

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    answer: String,
    source: Option<String>,
    now: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    schema_version: String,
    campaign_id: String,
    outcome: ChallengeOutcome,
}

async fn submit_challenge(
    Path((campaign_id, instance_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, HttpApiError> {
    let now = request.now.unwrap_or_else(wall_clock_now);
    let source = request.source.unwrap_or_else(|| "observer:anonymous".to_string());

    let (response, messages) = {
        let mut inner = state.inner.lock().await;
        let (outcome, campaign_id) = {
            let engine = require_campaign_mut(&mut inner, &campaign_id)?;
            let outcome = engine
                .submit_challenge(&instance_id, &request.answer, now, &source)
                .map_err(HttpApiError::from_submit)?;
            (outcome, engine.campaign_id().to_string())
        };

        let messages = collect_delta_messages(&mut inner, now);
        (
            SubmitResponse {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                campaign_id,
                outcome,
            },
            messages,
        )
    };

    broadcast_messages(&state, messages);

    Ok(Json(response))
}

#[derive(Debug, Deserialize, Default)]
struct RebootRequest {
    source: Option<String>,
    now: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RebootResponse {
    schema_version: String,
    campaign_id: String,
    outcome: RebootOutcome,
}

async fn reboot_campaign(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RebootRequest>,
) -> Result<Json<RebootResponse>, HttpApiError> {
    let now = request.now.unwrap_or_else(wall_clock_now);
    let source = request.source.unwrap_or_else(|| "observer:anonymous".to_string());

    let (response, messages) = {
        let mut inner = state.inner.lock().await;
        let (outcome, campaign_id) = {
            let engine = require_campaign_mut(&mut inner, &campaign_id)?;
            (engine.reboot(now, &source), engine.campaign_id().to_string())
        };

        let messages = collect_delta_messages(&mut inner, now);
        (
            RebootResponse {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                campaign_id,
                outcome,
            },
            messages,
        )
    };

    broadcast_messages(&state, messages);

    Ok(Json(response))
}
