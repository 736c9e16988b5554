// API Integration Tests
//
// Purpose: exercise every endpoint against an in-memory engine
// Run with: cargo test --features api --test api_integration_tests

#[cfg(feature = "api")]
mod api_tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use site_scorer_rust::{
        create_router, AppState, BoundingRegion, EngineOptions, ExclusionMask, Factor, FeatureSet,
        GridPoint, HazardBoundary, Polygon, PresentationConfig, ProximityFactor, RasterFactor,
        RasterGrid, ScoringCurve, ScoringEngine,
    };
    use std::sync::Arc;
    use tower::ServiceExt; // for oneshot

    // Helper: 5x5 grid around Brisbane, one substation, a temperature raster
    // and a flood square over the north-east corner
    fn create_test_app() -> axum::Router {
        let region = BoundingRegion::new(-28.0, -27.0, 152.0, 153.0, 0.25);

        let substations = Arc::new(FeatureSet::from_points(vec![GridPoint::new(-27.5, 152.5)]));
        let temperatures = vec![20.0, 21.0, 22.0, 23.0, 24.0, 25.0, 26.0, 27.0, 28.0];
        let raster = Arc::new(RasterGrid::new(-28.0, 152.0, 0.5, 0.5, 3, 3, temperatures).unwrap());
        let factors = vec![
            Factor::new(
                "substation",
                0.6,
                Arc::new(ProximityFactor::new("substations", substations)),
                ScoringCurve::new([(0.0, 10.0), (1000.0, 10.0), (100_000.0, 1.0)]).unwrap(),
            ),
            Factor::new(
                "temperature",
                0.4,
                Arc::new(RasterFactor::new("temperature", raster)),
                ScoringCurve::inverted_range(20.0, 28.0).unwrap(),
            ),
        ];
        let flood: Arc<dyn ExclusionMask> = Arc::new(HazardBoundary::new(
            "flood",
            vec![Polygon::new(
                vec![
                    GridPoint::new(-27.1, 152.9),
                    GridPoint::new(-27.1, 153.1),
                    GridPoint::new(-26.9, 153.1),
                    GridPoint::new(-26.9, 152.9),
                ],
                vec![],
            )],
        ));
        let options = EngineOptions {
            threads: 2,
            batch_size: 4,
            ..EngineOptions::default()
        };

        let engine = ScoringEngine::new(region, factors, vec![flood], options).unwrap();
        let state = AppState::from_engine(engine, PresentationConfig::default()).unwrap();
        create_router(state)
    }

    // Helper: Parse JSON response
    async fn json_response(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        serde_json::from_slice(&body).expect("Failed to parse JSON")
    }

    async fn get(uri: &str) -> axum::response::Response {
        create_test_app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(uri: &str, body: Value) -> axum::response::Response {
        create_test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    // =========================================================================
    // Section 1: Health Check
    // =========================================================================

    #[tokio::test]
    async fn test_health_check() {
        let response = get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_response(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["points"], 25);
        assert_eq!(json["factors"], serde_json::json!(["substation", "temperature"]));
    }

    // =========================================================================
    // Section 2: Precomputed Run
    // =========================================================================

    #[tokio::test]
    async fn test_heatmap_triples() {
        let response = get("/api/heatmap").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_response(response).await;
        let triples = json.as_array().unwrap();
        assert_eq!(triples.len(), 25);

        // Row-major: first is the south-west corner
        assert_eq!(triples[0][0], -28.0);
        assert_eq!(triples[0][1], 152.0);

        // North-east corner is flooded
        let last = triples[24].as_array().unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[2], 0.0);
    }

    #[tokio::test]
    async fn test_points_filter() {
        let response = get("/api/points?min_score=7.0&limit=3").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_response(response).await;
        let data = json["data"].as_array().unwrap();
        assert!(data.len() <= 3);
        assert!(!data.is_empty());
        for p in data {
            assert!(p["final_score"].as_f64().unwrap() >= 7.0);
            assert!(p["per_factor_score"]["substation"].is_number());
        }
    }

    #[tokio::test]
    async fn test_summary() {
        let json = json_response(get("/api/summary").await).await;
        assert_eq!(json["grid_points"], 25);
        assert_eq!(json["excluded"], 1);
        assert_eq!(json["batches"], 7);
    }

    #[tokio::test]
    async fn test_ranked_sites() {
        let response = get("/api/sites?limit=2").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_response(response).await;
        let sites = json["data"].as_array().unwrap();
        assert_eq!(sites.len(), 2);

        // Substation sits on (-27.5, 152.5)
        assert_eq!(sites[0]["lat"], -27.5);
        assert_eq!(sites[0]["lon"], 152.5);
        assert_eq!(sites[0]["label"], "Most desirable location");
        assert_eq!(sites[1]["rank"], 2);
    }

    #[tokio::test]
    async fn test_sites_limit_bounds() {
        assert_eq!(get("/api/sites?limit=0").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(get("/api/sites?limit=1000").await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_presentation_payload() {
        let json = json_response(get("/api/presentation").await).await;

        assert_eq!(json["title"], "Data Center Compass");
        assert_eq!(json["zoom"], 6);
        assert_eq!(json["marker"]["fillColor"], "#4285f4");
        assert_eq!(json["baseLayers"].as_array().unwrap().len(), 3);
        assert_eq!(json["heatmap"].as_array().unwrap().len(), 25);
        assert_eq!(json["sites"][0]["highlightRadiusM"], 20000.0);
    }

    // =========================================================================
    // Section 3: Ad-hoc Scoring
    // =========================================================================

    #[tokio::test]
    async fn test_score_points() {
        let body = serde_json::json!({
            "points": [
                { "lat": -27.5, "lon": 152.5 },
                { "lat": -27.0, "lon": 153.0 }
            ]
        });
        let response = post_json("/api/score", body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_response(response).await;
        assert_eq!(json["rows"], 2);

        // 0.6 * 10 + 0.4 * 5.5
        let best = json["data"][0]["final_score"].as_f64().unwrap();
        assert!((best - 8.2).abs() < 1e-9);

        assert_eq!(json["data"][0]["exclusion_masks"], serde_json::json!([]));
        assert_eq!(json["data"][1]["excluded"], true);
        assert_eq!(json["data"][1]["final_score"], 0.0);
        assert_eq!(json["data"][1]["exclusion_masks"], serde_json::json!(["flood"]));
    }

    #[tokio::test]
    async fn test_score_points_validation() {
        let empty = post_json("/api/score", serde_json::json!({ "points": [] })).await;
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
        let json = json_response(empty).await;
        assert!(json["error"].is_string());

        let body = serde_json::json!({ "points": [{ "lat": 95.0, "lon": 0.0 }] });
        let invalid = post_json("/api/score", body).await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }
}
