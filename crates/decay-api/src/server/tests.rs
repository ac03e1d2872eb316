use super::*;

#[test]
fn clamped_page_sizes_stay_in_bounds() {
    assert_eq!(clamp_page_size(None), DEFAULT_PAGE_SIZE);
    assert_eq!(clamp_page_size(Some(0)), 1);
    assert_eq!(clamp_page_size(Some(10)), 10);
    assert_eq!(clamp_page_size(Some(1_000_000)), MAX_PAGE_SIZE);
}

#[test]
fn delta_collection_emits_each_event_once() {
    let mut config = CampaignConfig::default();
    config.campaign_id = "delta_once".to_string();
    let mut inner = ServerInner {
        engine: Some(EngineApi::from_config(config).expect("valid config")),
        emitted_event_count: 0,
    };

    let engine = inner.engine.as_mut().expect("engine attached");
    engine.tick(12 * contracts::DAY_SECONDS, &ChannelContext::default());

    let first = collect_delta_messages(&mut inner, 0);
    assert!(!first.is_empty());
    let second = collect_delta_messages(&mut inner, 0);
    assert!(second.is_empty());
}

#[test]
fn stream_messages_serialize_with_a_type_tag() {
    let message = StreamMessage::announcement("c1", "a transmission", SeverityTier::Severe);
    let encoded = serde_json::to_value(&message).expect("serialize");
    assert_eq!(encoded["type"], "announcement");
    assert_eq!(encoded["campaign_id"], "c1");
    assert_eq!(encoded["payload"]["severity"], "severe");
}

#[test]
fn unknown_campaign_ids_are_rejected() {
    let inner = ServerInner::default();
    assert!(require_campaign(&inner, "nope").is_err());
}
