#[derive(Debug, Deserialize)]
struct ListCampaignsQuery {
    page_size: Option<usize>,
    sqlite_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListCampaignsResponse {
    schema_version: String,
    active_campaign_id: Option<String>,
    campaigns: Vec<PersistedCampaignSummary>,
}

async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<ListCampaignsResponse>, HttpApiError> {
    let page_size = clamp_page_size(query.page_size);
    let sqlite_path = query
        .sqlite_path
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path);

    let active_campaign_id = {
        let inner = state.inner.lock().await;
        inner
            .engine
            .as_ref()
            .map(|engine| engine.campaign_id().to_string())
    };

    let store = crate::persistence::SqliteCampaignStore::open(sqlite_path)
        .map_err(HttpApiError::from_persistence)?;
    let campaigns = store
        .list_campaigns(page_size)
        .map_err(HttpApiError::from_persistence)?;

    Ok(Json(ListCampaignsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        active_campaign_id,
        campaigns,
    }))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    now: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    schema_version: String,
    campaign_id: String,
    status: EngineStatus,
}

async fn get_status(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, HttpApiError> {
    let now = query.now.unwrap_or_else(wall_clock_now);
    let response = {
        let inner = state.inner.lock().await;
        let status = require_campaign(&inner, &campaign_id)?.status(now);
        StatusResponse {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            campaign_id: status.campaign_id.clone(),
            status,
        }
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    after_sequence: Option<u64>,
    page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    schema_version: String,
    campaign_id: String,
    events: Vec<EventRecord>,
    next_after_sequence: Option<u64>,
}

async fn get_events(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, HttpApiError> {
    let after_sequence = query.after_sequence.unwrap_or(0);
    let page_size = clamp_page_size(query.page_size);

    let response = {
        let inner = state.inner.lock().await;
        let engine = require_campaign(&inner, &campaign_id)?;
        let tail = engine.events_after(after_sequence);
        let events: Vec<EventRecord> = tail.iter().take(page_size).cloned().collect();
        let next_after_sequence = if tail.len() > page_size {
            events.last().map(|event| event.sequence)
        } else {
            None
        };
        EventsResponse {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            campaign_id: engine.campaign_id().to_string(),
            events,
            next_after_sequence,
        }
    };

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct TrendResponse {
    schema_version: String,
    campaign_id: String,
    trend: TrendReport,
}

async fn get_trend(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TrendResponse>, HttpApiError> {
    let response = {
        let inner = state.inner.lock().await;
        let engine = require_campaign(&inner, &campaign_id)?;
        TrendResponse {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            campaign_id: engine.campaign_id().to_string(),
            trend: engine.trend(),
        }
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct DiagnosticQuery {
    now: Option<i64>,
}

#[derive(Debug, Serialize)]
struct DiagnosticResponse {
    schema_version: String,
    campaign_id: String,
    report: String,
}

async fn get_diagnostic(
    Path(campaign_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<DiagnosticQuery>,
) -> Result<Json<DiagnosticResponse>, HttpApiError> {
    let now = query.now.unwrap_or_else(wall_clock_now);
    let response = {
        let inner = state.inner.lock().await;
        let engine = require_campaign(&inner, &campaign_id)?;
        DiagnosticResponse {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            campaign_id: engine.campaign_id().to_string(),
            report: engine.diagnostic_report(now),
        }
    };

    Ok(Json(response))
}
