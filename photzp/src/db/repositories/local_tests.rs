use super::*;
use crate::models::FitQuality;
use chrono::{DateTime, Duration, TimeZone, Utc};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 3, 1, 2, 0, 0).unwrap()
}

fn record(image: &str, telescope: &str, filter: &str, hours: i64, zeropoint: f64) -> CalibrationResult {
    CalibrationResult {
        image: ImageKey::new(image),
        observed_at: t0() + Duration::hours(hours),
        site: "lsc".to_string(),
        dome: "doma".to_string(),
        telescope: telescope.to_string(),
        camera: "fa15".to_string(),
        filter: filter.to_string(),
        airmass: 1.2,
        zeropoint,
        color_term: -0.01,
        scatter: 0.05,
        matched_pairs: 40,
        quality: FitQuality::Fitted,
    }
}

#[tokio::test]
async fn test_upsert_replaces_by_image() {
    let repo = LocalRepository::new();
    repo.upsert(&record("a", "1m0a", "gp", 0, 23.0)).await.unwrap();
    repo.upsert(&record("a", "1m0a", "gp", 0, 23.4)).await.unwrap();

    assert_eq!(repo.calibration_count(), 1);
    assert!(repo.exists(&ImageKey::new("a")).await.unwrap());
    assert!(!repo.exists(&ImageKey::new("b")).await.unwrap());

    let all = repo.query(&RecordQuery::default()).await.unwrap();
    assert_eq!(all[0].zeropoint, 23.4);
}

#[tokio::test]
async fn test_query_filters_and_orders() {
    let repo = LocalRepository::new();
    repo.upsert(&record("late", "1m0a", "gp", 5, 23.0)).await.unwrap();
    repo.upsert(&record("early", "1m0a", "gp", 1, 23.0)).await.unwrap();
    repo.upsert(&record("other-filter", "1m0a", "rp", 2, 23.0)).await.unwrap();
    repo.upsert(&record("other-scope", "1m0c", "gp", 3, 23.0)).await.unwrap();

    let query = RecordQuery::for_telescope(TelescopeId::new("lsc-doma-1m0a")).with_filters(["gp"]);
    let found = repo.query(&query).await.unwrap();
    let images: Vec<&str> = found.iter().map(|r| r.image.as_str()).collect();
    assert_eq!(images, vec!["early", "late"]);

    let windowed = RecordQuery::default().between(Some(t0() + Duration::hours(2)), Some(t0() + Duration::hours(5)));
    let found = repo.query(&windowed).await.unwrap();
    let images: Vec<&str> = found.iter().map(|r| r.image.as_str()).collect();
    assert_eq!(images, vec!["other-filter", "other-scope"]);
}

#[tokio::test]
async fn test_query_by_camera() {
    let repo = LocalRepository::new();
    repo.upsert(&record("fa15-frame", "1m0a", "gp", 0, 23.0)).await.unwrap();
    let mut swapped = record("fa03-frame", "1m0a", "gp", 1, 23.1);
    swapped.camera = "fa03".to_string();
    repo.upsert(&swapped).await.unwrap();

    let query = RecordQuery::for_telescope(TelescopeId::new("lsc-doma-1m0a")).with_camera("fa03");
    let found = repo.query(&query).await.unwrap();
    assert_eq!(found, vec![swapped]);
    assert!(repo
        .query(&RecordQuery::default().with_camera("kb95"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_write_trend_replaces_whole_series() {
    let repo = LocalRepository::new();
    let telescope = TelescopeId::new("lsc-doma-1m0a");
    let first = vec![
        TrendPoint::new(t0(), 23.0),
        TrendPoint::new(t0() + Duration::days(1), 23.1),
        TrendPoint::new(t0() + Duration::days(2), 23.2),
    ];
    repo.write_trend(&telescope, "gp", &first).await.unwrap();

    let second = vec![
        TrendPoint::new(t0() + Duration::days(9), 22.9),
        TrendPoint::new(t0() + Duration::days(8), 22.8),
    ];
    repo.write_trend(&telescope, "gp", &second).await.unwrap();

    let stored = repo.read_trend(&telescope, "gp").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].value, 22.8);
    assert!(repo.read_trend(&telescope, "rp").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_trend_models_by_class() {
    let repo = LocalRepository::new();
    let point = [TrendPoint::new(t0(), 23.0)];
    repo.write_trend(&TelescopeId::new("lsc-doma-1m0a"), "gp", &point).await.unwrap();
    repo.write_trend(&TelescopeId::new("cpt-domb-1m0a"), "gp", &point).await.unwrap();
    repo.write_trend(&TelescopeId::new("ogg-clma-0m4b"), "gp", &point).await.unwrap();
    repo.write_trend(&TelescopeId::new("lsc-doma-1m0a"), "rp", &point).await.unwrap();

    let models = repo
        .find_trend_models(&TelescopeClass::new("1m0"), "gp")
        .await
        .unwrap();
    assert_eq!(models.len(), 2);
    assert!(models.iter().all(|m| m.filter == "gp"));
}

#[tokio::test]
async fn test_unhealthy_repository_rejects_operations() {
    let repo = LocalRepository::new();
    repo.set_healthy(false);
    assert!(!repo.health_check().await.unwrap());

    let err = repo.upsert(&record("a", "1m0a", "gp", 0, 23.0)).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ConnectionError { .. }));
    assert!(err.is_retryable());

    repo.set_healthy(true);
    repo.upsert(&record("a", "1m0a", "gp", 0, 23.0)).await.unwrap();
    repo.clear();
    assert_eq!(repo.calibration_count(), 0);
    assert!(repo.health_check().await.unwrap());
}
