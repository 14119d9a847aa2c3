//! Reporting queries against a live database

mod common;

use chrono::{Duration, Utc};
use pharmadb_core::{ExperimentResult, Pagination, SenderType, StandardRange};
use pharmadb_store::workflows;
use pharmadb_store::{
    table_names, ConversationSearch, Measurement, NewConversation, NewExperiment, NewMessage,
};

#[tokio::test]
#[ignore = "requires database"]
async fn inspector_and_conversation_figures() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();
    let inspector = common::inspector(&mut session).await;
    let start = Utc::now() - Duration::hours(2);

    let opened = workflows::open_conversation(
        &mut session,
        NewConversation::new(inspector.inspector_id, format!("sess-{}", common::suffix()), start)
            .topic("微生物限度检查"),
        vec![NewMessage::inspector("霉菌计数方法?"), NewMessage::system("参见通则1105。")],
    )
    .await
    .unwrap();
    workflows::end_conversation(
        &mut session,
        opened.conversation.conversation_id,
        start + Duration::minutes(10),
    )
    .await
    .unwrap();

    let stats = session.reports().inspector_stats(inspector.inspector_id).await.unwrap();
    assert_eq!(stats.conversation_count, 1);
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.experiment_count, 0);
    assert!(stats.last_conversation_at.is_some());

    let volume = session
        .reports()
        .conversation_stats(Some(inspector.inspector_id))
        .await
        .unwrap();
    assert_eq!(volume.conversations, 1);
    assert_eq!(volume.avg_messages, Some(2.0));
    let duration = volume.avg_duration_secs.unwrap();
    assert!((duration - 600.0).abs() < 1.0);

    let senders = session
        .reports()
        .message_stats(Some(opened.conversation.conversation_id))
        .await
        .unwrap();
    assert_eq!(senders.len(), 2);
    assert!(senders.iter().any(|s| s.sender_type == SenderType::System && s.messages == 1));

    assert!(session.reports().inspector_stats(-1).await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ignore = "requires database"]
async fn search_matches_message_text() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();
    let inspector = common::inspector(&mut session).await;
    let marker = format!("标记{}", common::suffix());

    workflows::open_conversation(
        &mut session,
        NewConversation::new(inspector.inspector_id, format!("sess-{}", common::suffix()), Utc::now()),
        vec![NewMessage::inspector(format!("关于{marker}的问题"))],
    )
    .await
    .unwrap();
    common::conversation(&mut session, inspector.inspector_id).await;

    let search = ConversationSearch {
        inspector_id: Some(inspector.inspector_id),
        keywords: Some(marker),
        ..ConversationSearch::default()
    };
    let page = session
        .reports()
        .search_conversations(&search, Pagination::first(10))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].inspector_name, inspector.name);

    let everything = ConversationSearch {
        inspector_id: Some(inspector.inspector_id),
        ..ConversationSearch::default()
    };
    let page = session
        .reports()
        .search_conversations(&everything, Pagination::first(10))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
#[ignore = "requires database"]
async fn item_and_laboratory_summaries() {
    let store = common::store().await;
    let mut session = store.acquire().await.unwrap();
    let inspector = common::inspector(&mut session).await;
    let lab = common::laboratory(&mut session).await;
    let item = common::item(&mut session).await;
    let range = StandardRange::between(95.0, 100.0).unwrap();

    for (day, value) in [(1, 98.0), (2, 102.0)] {
        let recorded = workflows::create_experiment_with_data_points(
            &mut session,
            NewExperiment::new(
                format!("EXP-{}", common::suffix()),
                inspector.inspector_id,
                lab.lab_id,
                item.item_id,
                common::date(2025, 7, day),
            ),
            vec![Measurement::new("含量", value).within(range)],
        )
        .await
        .unwrap();
        if value <= 100.0 {
            workflows::complete_experiment(
                &mut session,
                recorded.experiment_id,
                ExperimentResult::Qualified,
                None,
            )
            .await
            .unwrap();
        }
    }

    let summary = session.reports().item_summary(item.item_id).await.unwrap();
    assert_eq!(summary.results.experiments, 2);
    assert_eq!(summary.results.qualified, 1);
    assert_eq!(summary.results.undecided, 1);
    assert_eq!(summary.measurements.len(), 1);
    assert_eq!(summary.measurements[0].qualified, 1);
    assert_eq!(summary.measurements[0].max_value, Some(102.0));
    assert_eq!(summary.recent.len(), 2);
    assert_eq!(summary.recent[0].experiment_date, common::date(2025, 7, 2));

    let labs = session.reports().laboratory_stats().await.unwrap();
    let ours = labs.iter().find(|l| l.lab_id == lab.lab_id).unwrap();
    assert_eq!(ours.experiments, 2);
    assert_eq!(ours.completion_rate(), Some(50.0));
    assert_eq!(ours.pass_rate(), Some(100.0));

    let counts = session.reports().table_counts().await.unwrap();
    assert_eq!(counts.len(), table_names().len());
    assert!(counts.iter().all(|c| c.rows >= 0));
}
