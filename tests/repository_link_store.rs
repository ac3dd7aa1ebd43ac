mod common;

use sqlx::PgPool;
use std::sync::Arc;

use penshort::domain::entities::{LinkPatch, NewLink, RedirectType};
use penshort::domain::repositories::LinkStore;
use penshort::infrastructure::persistence::PgLinkStore;

#[sqlx::test]
async fn test_create_link(pool: PgPool) {
    let owner = common::create_test_user(&pool).await;
    let store = PgLinkStore::new(Arc::new(pool));

    let link = store
        .create(NewLink {
            owner_id: owner,
            short_code: "test123".to_string(),
            destination: "https://example.com".to_string(),
            redirect_type: RedirectType::Temporary,
            expires_at: None,
            max_clicks: None,
        })
        .await
        .unwrap();

    assert_eq!(link.short_code, "test123");
    assert_eq!(link.destination, "https://example.com");
    assert_eq!(link.click_count, 0);
    assert!(link.enabled);
}

#[sqlx::test]
async fn test_create_rejects_duplicate_short_code(pool: PgPool) {
    let owner = common::create_test_user(&pool).await;
    let store = PgLinkStore::new(Arc::new(pool));

    let new_link = |code: &str| NewLink {
        owner_id: owner,
        short_code: code.to_string(),
        destination: "https://example.com".to_string(),
        redirect_type: RedirectType::Temporary,
        expires_at: None,
        max_clicks: None,
    };

    store.create(new_link("dup1")).await.unwrap();
    let result = store.create(new_link("dup1")).await;

    assert!(result.is_err());
}

#[sqlx::test]
async fn test_short_code_reusable_after_soft_delete(pool: PgPool) {
    let owner = common::create_test_user(&pool).await;
    let store = PgLinkStore::new(Arc::new(pool));

    let new_link = |code: &str| NewLink {
        owner_id: owner,
        short_code: code.to_string(),
        destination: "https://example.com".to_string(),
        redirect_type: RedirectType::Temporary,
        expires_at: None,
        max_clicks: None,
    };

    let link = store.create(new_link("reuseme")).await.unwrap();
    store.soft_delete(link.id).await.unwrap();

    let result = store.create(new_link("reuseme")).await;
    assert!(result.is_ok());
}

#[sqlx::test]
async fn test_get_by_short_code_excludes_deleted(pool: PgPool) {
    let owner = common::create_test_user(&pool).await;
    let store = PgLinkStore::new(Arc::new(pool));

    let link = store
        .create(NewLink {
            owner_id: owner,
            short_code: "vanish".to_string(),
            destination: "https://example.com".to_string(),
            redirect_type: RedirectType::Temporary,
            expires_at: None,
            max_clicks: None,
        })
        .await
        .unwrap();

    store.soft_delete(link.id).await.unwrap();

    let found = store.get_by_short_code("vanish").await.unwrap();
    assert!(found.is_none());
}

#[sqlx::test]
async fn test_get_by_short_code_not_found(pool: PgPool) {
    let store = PgLinkStore::new(Arc::new(pool));

    let result = store.get_by_short_code("notfound").await.unwrap();

    assert!(result.is_none());
}

#[sqlx::test]
async fn test_update_applies_patch(pool: PgPool) {
    let owner = common::create_test_user(&pool).await;
    let store = PgLinkStore::new(Arc::new(pool));

    let link = store
        .create(NewLink {
            owner_id: owner,
            short_code: "patchme".to_string(),
            destination: "https://old.example.com".to_string(),
            redirect_type: RedirectType::Temporary,
            expires_at: None,
            max_clicks: None,
        })
        .await
        .unwrap();

    let updated = store
        .update(
            link.id,
            LinkPatch {
                destination: Some("https://new.example.com".to_string()),
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.destination, "https://new.example.com");
    assert!(!updated.enabled);
}

#[sqlx::test]
async fn test_apply_click_deltas_increments_count(pool: PgPool) {
    let owner = common::create_test_user(&pool).await;
    let store = PgLinkStore::new(Arc::new(pool));

    let a = store
        .create(NewLink {
            owner_id: owner,
            short_code: "counta".to_string(),
            destination: "https://example.com/a".to_string(),
            redirect_type: RedirectType::Temporary,
            expires_at: None,
            max_clicks: None,
        })
        .await
        .unwrap();
    let b = store
        .create(NewLink {
            owner_id: owner,
            short_code: "countb".to_string(),
            destination: "https://example.com/b".to_string(),
            redirect_type: RedirectType::Temporary,
            expires_at: None,
            max_clicks: None,
        })
        .await
        .unwrap();

    store.apply_click_deltas(&[(a.id, 3), (b.id, 5)]).await.unwrap();

    let a_reloaded = store.get_by_id(a.id).await.unwrap().unwrap();
    let b_reloaded = store.get_by_id(b.id).await.unwrap().unwrap();

    assert_eq!(a_reloaded.click_count, 3);
    assert_eq!(b_reloaded.click_count, 5);
}

#[sqlx::test]
async fn test_list_by_owner_paginates(pool: PgPool) {
    let owner = common::create_test_user(&pool).await;
    let store = PgLinkStore::new(Arc::new(pool));

    for i in 0..5 {
        store
            .create(NewLink {
                owner_id: owner,
                short_code: format!("page{i}"),
                destination: "https://example.com".to_string(),
                redirect_type: RedirectType::Temporary,
                expires_at: None,
                max_clicks: None,
            })
            .await
            .unwrap();
    }

    let page1 = store.list_by_owner(owner, 1, 3).await.unwrap();
    let page2 = store.list_by_owner(owner, 2, 3).await.unwrap();

    assert_eq!(page1.len(), 3);
    assert_eq!(page2.len(), 2);
}
