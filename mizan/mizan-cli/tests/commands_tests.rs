use mizan_cli::commands;
use mizan_cli::{OutputFormat, Workspace};
use mizan_core::config::MizanConfig;
use mizan_core::types::DocumentStatus;
use tempfile::TempDir;

const MURABAHA: &str = "Murabaha is a sale of goods at cost plus an agreed profit, \
                        where the cost is disclosed to the buyer.";

fn config(dir: &TempDir) -> MizanConfig {
    let mut config = MizanConfig::default();
    config.general.data_dir = dir.path().join("data");
    config.providers.embedding_provider = "hashing".to_string();
    config.providers.embedding_dimension = 64;
    config.extraction.ocr_enabled = false;
    config.extraction.premium_endpoint = None;
    config
}

#[tokio::test]
async fn test_ingest_persists_workspace() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("murabaha.txt");
    tokio::fs::write(&file, MURABAHA).await.unwrap();

    commands::ingest(config(&dir), vec![file], "AAOIFI".to_string(), OutputFormat::Json)
        .await
        .unwrap();

    assert!(config(&dir).snapshot_path().exists());
    let workspace = Workspace::open(config(&dir)).await.unwrap();
    let documents = workspace.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].document.source_label, "AAOIFI");
    assert_eq!(documents[0].document.file_name, "murabaha.txt");
    assert_eq!(documents[0].status, DocumentStatus::Indexed);
}

#[tokio::test]
async fn test_ingest_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.pdf");

    let label = "BNM".to_string();
    let result = commands::ingest(config(&dir), vec![missing], label, OutputFormat::Json).await;
    assert!(result.is_err());
    assert!(Workspace::open(config(&dir)).await.unwrap().documents().is_empty());
}

#[tokio::test]
async fn test_ask_rejects_unknown_language() {
    let dir = TempDir::new().unwrap();
    let options = commands::AskOptions {
        response_language: Some("fr".to_string()),
        ..Default::default()
    };

    let question = "What is Murabaha?".to_string();
    let err = commands::ask(config(&dir), question, options, OutputFormat::Json)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("unsupported language"));
}
