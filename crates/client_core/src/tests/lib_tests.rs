use super::*;

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{Stage, TreeMethod},
    error::ErrorKind,
};
use tokio::net::TcpListener;

async fn upload(mut multipart: Multipart) -> Json<Value> {
    let mut filename = String::new();
    let mut names = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        filename = field.file_name().unwrap_or_default().to_string();
        let text = field.text().await.unwrap_or_default();
        names = text
            .lines()
            .filter_map(|line| line.strip_prefix('>'))
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
    }
    let session_id = filename.trim_end_matches(".fasta").to_string();
    Json(json!({
        "session_id": session_id,
        "filename": filename,
        "sequences_count": names.len(),
        "sequences": names,
    }))
}

async fn align(Path(session_id): Path<String>) -> Json<Value> {
    let status = if session_id == "broken" { "error" } else { "success" };
    Json(json!({
        "status": status,
        "alignment_length": 6,
        "aligned_sequences": { "human": "ACGT-A", "chimp": "ACGTTA", "gorilla": "AC-TTA" },
    }))
}

async fn build_tree(Path((_session_id, method)): Path<(String, String)>) -> Json<Value> {
    let support = if method == "nj" { 100.0 } else { 87.0 };
    Json(json!({
        "status": "success",
        "method": method,
        "newick": "((human,chimp),gorilla);",
        "tree_json": {
            "name": "",
            "children": [
                {
                    "name": "",
                    "confidence": support,
                    "children": [{ "name": "human" }, { "name": "chimp" }],
                },
                { "name": "gorilla", "branch_length": 0.3 },
            ],
        },
    }))
}

async fn compare(Path(_session_id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "method1": body["method1"],
        "method2": body["method2"],
        "comparison": {
            "terminals": { "common": ["chimp", "gorilla", "human"], "unique_tree1": [], "unique_tree2": [] },
            "rf_distance": {
                "distance": 0, "max_distance": 2, "normalized": 0.0,
                "common_clades": 1, "unique_clades_tree1": 0, "unique_clades_tree2": 0,
            },
            "topology": {
                "internal_nodes_tree1": 2, "internal_nodes_tree2": 2,
                "max_depth_tree1": 2, "max_depth_tree2": 2, "depth_difference": 0,
            },
            "branch_lengths": { "info": "No branch length data available" },
            "support_values": {
                "tree1": { "count": 1, "mean": 100.0, "median": 100.0, "min": 100.0, "max": 100.0 },
                "tree2": { "count": 1, "mean": 87.0, "median": 87.0, "min": 87.0, "max": 87.0 },
                "difference": { "mean_diff": 13.0, "median_diff": 13.0 },
            },
            "similarity_score": {
                "terminal_similarity": 1.0,
                "topological_similarity": 1.0,
                "overall_similarity": 1.0,
                "similarity_percentage": 100.0,
            },
        },
    }))
}

async fn spawn_analysis_service() -> anyhow::Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/api/upload_fasta", post(upload))
        .route("/api/align/:session_id", post(align))
        .route("/api/build_tree/:session_id/:method", post(build_tree))
        .route("/api/compare_trees/:session_id", post(compare));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn primates(filename: &str) -> FastaUpload {
    FastaUpload::new(
        filename,
        b">human\nACGTA\n>chimp\nACGTTA\n>gorilla\nACTTA\n".to_vec(),
    )
}

async fn controller() -> PipelineController {
    let base = spawn_analysis_service().await.expect("spawn service");
    PipelineController::from_settings(&Settings {
        api_base_url: base,
        ..Settings::default()
    })
    .expect("controller")
}

#[tokio::test]
async fn full_workflow_over_http() {
    let controller = Arc::new(controller().await);

    let session = controller
        .submit_upload(primates("primates.fasta"))
        .await
        .expect("upload");
    assert_eq!(session.session_id.as_str(), "primates");
    assert_eq!(session.sequence_count, 3);

    let alignment = controller.request_alignment().await.expect("align");
    let preview = alignment.preview(4);
    assert_eq!(preview[0].name, "chimp");
    assert_eq!(preview[0].columns, "ACGT");
    assert!(preview[0].truncated);

    let (nj, ml) = tokio::join!(
        controller.request_tree(TreeMethod::Nj),
        controller.request_tree(TreeMethod::Ml)
    );
    assert!(nj.expect("nj").leaf_names_match(&session.sequence_names));
    ml.expect("ml");

    let comparison = controller
        .request_comparison(&TreeMethod::ALL)
        .await
        .expect("compare");
    assert!(comparison.branch_lengths.is_none());
    let support = comparison.support_values.expect("support stats");
    assert_eq!(support.difference.mean_diff, 13.0);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.stage, Stage::Comparison);
    assert!(snapshot.operations.is_empty());

    let interpretation = controller.interpretation().await.expect("interpretation");
    assert_eq!(interpretation.similarity, SimilarityBand::VerySimilar);
    assert_eq!(interpretation.topology, TopologyBand::VerySimilar);

    let mut diagrams = Vec::new();
    for method in TreeMethod::ALL {
        let layout = controller.layout(method).await.expect("layout");
        diagrams.push(render::project(
            &layout,
            render::Viewport::default(),
            method.info().display_name,
        ));
    }
    let svg = render::render_side_by_side(&diagrams).to_string();
    assert!(svg.contains("gorilla"));
    assert!(svg.contains("translate(500,0)"));
}

#[tokio::test]
async fn non_success_status_is_a_server_error() {
    let controller = controller().await;
    controller
        .submit_upload(primates("broken.fasta"))
        .await
        .expect("upload");

    let err = controller.request_alignment().await.expect_err("status error");
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(controller.stage().await, Stage::Sequences);
    let status = controller.status(OperationKey::Align);
    assert!(!status.in_flight);
    assert_eq!(status.last_error.map(|err| err.kind), Some(ErrorKind::Server));
}

#[tokio::test]
async fn unreachable_service_leaves_the_stage_alone() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let controller = PipelineController::from_settings(&Settings {
        api_base_url: format!("http://{addr}"),
        ..Settings::default()
    })
    .expect("controller");

    let err = controller
        .submit_upload(primates("primates.fasta"))
        .await
        .expect_err("refused");
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(controller.stage().await, Stage::Upload);
    assert_eq!(
        controller
            .snapshot()
            .await
            .status(OperationKey::Upload)
            .last_error
            .map(|err| err.kind),
        Some(ErrorKind::Network)
    );
}
