//! Dispatch number generator tests: format, year-scoped reset, width
//! overflow, and monotonic uniqueness.

mod common;

use chrono::{Datelike, Utc};
use common::TestApp;
use labops_api::entities::dispatch_counter;
use labops_api::services::numbering::{
    format_dispatch_number, is_sequential_dispatch_number,
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};

async fn seed_counter(app: &TestApp, count: i64, last_reset_year: i32) {
    dispatch_counter::ActiveModel {
        id: Set(1),
        count: Set(count),
        last_reset_year: Set(last_reset_year),
    }
    .insert(&*app.db())
    .await
    .expect("seed counter");
}

#[tokio::test]
async fn first_draw_lazily_creates_the_counter() {
    let app = TestApp::new().await;
    let year = Utc::now().year();

    let number = app.services().numbering.next().await;
    assert_eq!(number, format_dispatch_number(year, 1));

    let row = dispatch_counter::Entity::find_by_id(1)
        .one(&*app.db())
        .await
        .unwrap()
        .expect("counter row created");
    assert_eq!(row.count, 1);
    assert_eq!(row.last_reset_year, year);
}

#[tokio::test]
async fn width_is_a_minimum_not_a_cap() {
    let app = TestApp::new().await;
    let year = Utc::now().year();
    seed_counter(&app, 999_999, year).await;

    let number = app.services().numbering.next().await;
    assert_eq!(number, format!("REQ-{}-1000000", year));
}

#[tokio::test]
async fn stale_year_resets_the_sequence() {
    let app = TestApp::new().await;
    let year = Utc::now().year();
    seed_counter(&app, 4_182, year - 2).await;

    let number = app.services().numbering.next().await;
    assert_eq!(number, format_dispatch_number(year, 1));
    assert!(number.ends_with("-000001"));

    let row = dispatch_counter::Entity::find_by_id(1)
        .one(&*app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.count, 1);
    assert_eq!(row.last_reset_year, year);
}

#[tokio::test]
async fn numbers_are_unique_and_strictly_increasing_within_a_year() {
    let app = TestApp::new().await;

    let mut numbers = Vec::new();
    for _ in 0..25 {
        numbers.push(app.services().numbering.next().await);
    }

    for number in &numbers {
        assert!(
            is_sequential_dispatch_number(number),
            "unexpected format: {}",
            number
        );
    }

    let unique: std::collections::HashSet<_> = numbers.iter().collect();
    assert_eq!(unique.len(), numbers.len(), "all numbers distinct");

    let mut sorted = numbers.clone();
    sorted.sort();
    assert_eq!(
        sorted, numbers,
        "zero-padded numbers sort in generation order"
    );
}

#[tokio::test]
async fn concurrent_draws_never_collide() {
    let app = TestApp::new().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let numbering = app.services().numbering.clone();
        handles.push(tokio::spawn(async move { numbering.next().await }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap());
    }

    let unique: std::collections::HashSet<_> = numbers.iter().collect();
    assert_eq!(unique.len(), numbers.len());
}

#[tokio::test]
async fn submission_stamps_a_sequential_dispatch_number() {
    let app = TestApp::new().await;
    let product = app.seed_product("N1", "Filters", 10).await;

    let first = app.submit(vec![TestApp::item(product.id, "Filters", 1)]).await;
    let second = app.submit(vec![TestApp::item(product.id, "Filters", 2)]).await;

    assert!(is_sequential_dispatch_number(&first.dispatch_number));
    assert!(is_sequential_dispatch_number(&second.dispatch_number));
    assert!(second.dispatch_number > first.dispatch_number);
}
