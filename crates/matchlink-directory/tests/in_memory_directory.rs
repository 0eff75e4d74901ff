//! Integration tests for the in-memory directory, driven through the
//! `SessionDirectory` trait the way the orchestrator uses it.

use std::time::Duration;

use matchlink_directory::{
    AnonymousAuthenticator, Authenticator, DirectoryConfig, DirectoryError, InMemoryDirectory,
    SessionDirectory,
};
use matchlink_protocol::{
    CreateSessionRequest, DataObject, JOIN_CODE_KEY, QueryOrder, QuickJoinCriteria, Session,
    SessionQuery, SortField,
};

async fn publish<D: SessionDirectory>(dir: &D, name: &str, max_players: usize) -> Session {
    let host = AnonymousAuthenticator.sign_in().await.unwrap();
    dir.create_session(
        &host,
        CreateSessionRequest::new(name, max_players)
            .with_data(JOIN_CODE_KEY, DataObject::member(format!("CODE{name}"))),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_clones_share_sessions() {
    let host_side = InMemoryDirectory::default();
    let client_side = host_side.clone();

    let session = publish(&host_side, "Arena", 8).await;
    let player = AnonymousAuthenticator.sign_in().await.unwrap();

    let joined = client_side
        .join_session_by_id(&player, &session.id)
        .await
        .expect("clone should see the session");

    assert_eq!(joined.player_count(), 2);
    assert_eq!(joined.join_code(), Some("CODEArena"));
}

#[tokio::test(start_paused = true)]
async fn test_query_sessions_orders_by_slots_then_newest() {
    let dir = InMemoryDirectory::default();

    let a = publish(&dir, "A", 8).await;
    tokio::time::advance(Duration::from_millis(10)).await;
    let b = publish(&dir, "B", 8).await;
    tokio::time::advance(Duration::from_millis(10)).await;
    let c = publish(&dir, "C", 4).await;

    let found = dir
        .query_sessions(SessionQuery::open_lobbies(20))
        .await
        .unwrap();

    let ids: Vec<_> = found.iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec![c.id, b.id, a.id]);
    assert!(found.iter().all(|s| s.join_code().is_none()));
}

#[tokio::test]
async fn test_query_sessions_respects_count() {
    let dir = InMemoryDirectory::default();
    for i in 0..5 {
        publish(&dir, &format!("lobby-{i}"), 4).await;
    }

    let query = SessionQuery {
        count: 3,
        order: vec![QueryOrder::asc(SortField::Name)],
        ..SessionQuery::default()
    };
    let found = dir.query_sessions(query).await.unwrap();

    let names: Vec<_> = found.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["lobby-0", "lobby-1", "lobby-2"]);
}

#[tokio::test]
async fn test_full_sessions_are_not_listed_or_quick_joined() {
    let dir = InMemoryDirectory::default();
    let session = publish(&dir, "duo", 2).await;
    let p1 = AnonymousAuthenticator.sign_in().await.unwrap();
    dir.join_session_by_id(&p1, &session.id).await.unwrap();

    let listed = dir.query_sessions(SessionQuery::open_lobbies(20)).await.unwrap();
    assert!(listed.is_empty());

    let p2 = AnonymousAuthenticator.sign_in().await.unwrap();
    let result = dir.quick_join(&p2, QuickJoinCriteria::default()).await;
    assert!(matches!(result, Err(DirectoryError::NoMatchingSession)));
}

#[tokio::test(start_paused = true)]
async fn test_expired_sessions_vanish_from_queries() {
    let dir = InMemoryDirectory::new(DirectoryConfig {
        session_expiry: Duration::from_secs(10),
        max_sessions: None,
    });
    publish(&dir, "Arena", 8).await;

    tokio::time::advance(Duration::from_secs(11)).await;

    let listed = dir.query_sessions(SessionQuery::default()).await.unwrap();
    assert!(listed.is_empty());
    assert!(dir.is_empty().await);
}
