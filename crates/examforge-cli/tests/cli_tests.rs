//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TRUE_FALSE_EXAM: &str = "\
Enunciado 1: Seleccionar verdadero o falso: La fotosíntesis libera oxígeno.
Respuesta: Verdadero
Enunciado 2: Seleccionar verdadero o falso: Las plantas no necesitan luz.
Respuesta: Falso
";

/// A command isolated from the caller's config files and key overrides.
fn examforge(dir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("examforge").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("EXAMFORGE_OPENAI_KEY")
        .env_remove("EXAMFORGE_ANTHROPIC_KEY")
        .env_remove("EXAMFORGE_WOLFRAM_APP_ID");
    cmd
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("examforge.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn openai_config(dir: &Path, base_url: &str) -> std::path::PathBuf {
    write_config(
        dir,
        &format!(
            "default_provider = \"openai\"\n\
             results_path = '{}'\n\n\
             [providers.openai]\n\
             type = \"openai\"\n\
             api_key = \"test-key\"\n\
             base_url = \"{base_url}\"\n",
            dir.join("results.jsonl").display()
        ),
    )
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}, "index": 0}],
        "model": "gpt-4o",
        "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20}
    }))
}

async fn mount_exam_provider(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("formato verdadero o falso"))
        .respond_with(chat_reply(TRUE_FALSE_EXAM))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("El alumno respond"))
        .respond_with(chat_reply("Las plantas necesitan luz para la fotosíntesis."))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Preguntas falladas"))
        .respond_with(chat_reply(
            "Te recomendamos enfocarte en los requisitos de la fotosíntesis.",
        ))
        .mount(server)
        .await;
}

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    examforge(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("take"))
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("math"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn version_flag() {
    let dir = TempDir::new().unwrap();
    examforge(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("examforge"));
}

#[test]
fn init_creates_config_once() {
    let dir = TempDir::new().unwrap();

    examforge(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created examforge.toml"));
    assert!(dir.path().join("examforge.toml").exists());

    examforge(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn parse_saved_completion() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("exam.txt");
    std::fs::write(
        &file,
        "Enunciado 1: ¿Capital de Francia?\na) París\nb) Roma\nc) Madrid\nd) Lisboa\nRespuesta: a\n\
         Enunciado 2: ¿Capital de Italia?\na) París\nb) Roma\nc) Madrid\nd) Lisboa\n",
    )
    .unwrap();

    examforge(dir.path())
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 blocks, 1 questions, 1 discarded"))
        .stdout(predicate::str::contains("no answer key"));

    let output = examforge(dir.path())
        .arg("parse")
        .arg(&file)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let questions: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(questions.as_array().unwrap().len(), 1);
    assert_eq!(questions[0]["correct_key"], "a");
    assert_eq!(questions[0]["kind"], "multiple");
}

#[test]
fn parse_rejects_math_and_missing_files() {
    let dir = TempDir::new().unwrap();
    examforge(dir.path())
        .args(["parse", "nope.txt", "--format", "math"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("math exercises"));

    examforge(dir.path())
        .args(["parse", "nope.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read completion"));

    examforge(dir.path())
        .args(["parse", "nope.txt", "--format", "essay"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown exam format"));
}

#[test]
fn take_needs_a_configured_provider() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "default_provider = \"openai\"\n");

    examforge(dir.path())
        .args(["take", "--topic", "Historia", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("provider 'openai' not found"));
}

#[test]
fn take_reports_unreadable_document() {
    let dir = TempDir::new().unwrap();
    examforge(dir.path())
        .args(["take", "--document", "apuntes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read 'apuntes.txt'"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    examforge(dir.path())
        .args(["list-models", "--config", "missing.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn list_models_for_configured_provider() {
    let dir = TempDir::new().unwrap();
    let config = openai_config(dir.path(), "http://localhost:1");
    examforge(dir.path())
        .arg("list-models")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider: openai (default)"))
        .stdout(predicate::str::contains("gpt-4o"));
}

#[test]
fn history_without_results() {
    let dir = TempDir::new().unwrap();
    examforge(dir.path())
        .args(["history", "--results", "results.jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored results"));
}

#[tokio::test(flavor = "multi_thread")]
async fn take_exam_from_answers_file() {
    let server = MockServer::start().await;
    mount_exam_provider(&server).await;

    let dir = TempDir::new().unwrap();
    let config = openai_config(dir.path(), &server.uri());
    let answers = dir.path().join("answers.txt");
    std::fs::write(&answers, "verdadero\nverdadero\n").unwrap();
    let root = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        examforge(&root)
            .args(["take", "--topic", "Fotosíntesis", "--format", "true_false"])
            .args(["--count", "2", "--title", "Parcial de biología"])
            .arg("--config")
            .arg(&config)
            .arg("--answers")
            .arg(&answers)
            .assert()
            .success()
            .stdout(predicate::str::contains("Parcial de biología"))
            .stdout(predicate::str::contains("Pregunta 2 de 2"))
            .stdout(predicate::str::contains("Grade: 5.00 / 10"))
            .stdout(predicate::str::contains("la correcta era 'falso'"))
            .stdout(predicate::str::contains("Las plantas necesitan luz"))
            .stdout(predicate::str::contains("Te recomendamos enfocarte en"))
            .stderr(predicate::str::contains("Result saved to"));

        let stored = std::fs::read_to_string(root.join("results.jsonl")).unwrap();
        assert_eq!(stored.lines().count(), 1);

        examforge(&root)
            .args(["history", "--config"])
            .arg(root.join("examforge.toml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Parcial de biología"))
            .stdout(predicate::str::contains("5.00"))
            .stdout(predicate::str::contains("1 exams"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_clears_answers() {
    let server = MockServer::start().await;
    mount_exam_provider(&server).await;

    let dir = TempDir::new().unwrap();
    let config = openai_config(dir.path(), &server.uri());
    let root = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        examforge(&root)
            .args(["take", "--topic", "Fotosíntesis", "--format", "true_false"])
            .args(["--count", "2", "--no-store", "--config"])
            .arg(&config)
            .write_stdin("falso\n:restart\nverdadero\nfalso\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Exam restarted."))
            .stdout(predicate::str::contains("Grade: 10.00 / 10"));
        assert!(!root.join("results.jsonl").exists());

        examforge(&root)
            .args(["take", "--topic", "Fotosíntesis", "--format", "true_false"])
            .args(["--count", "2", "--no-store", "--config"])
            .arg(&config)
            .write_stdin("verdadero\n")
            .assert()
            .failure()
            .stderr(predicate::str::contains("input ended after 1 of 2 questions"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn math_lookup_against_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/query"))
        .and(query_param("input", "solve x^2 - 4 = 0"))
        .and(query_param("appid", "APP-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<queryresult success='true' error='false' numpods='2'>\
             <pod title='Input interpretation'><subpod><plaintext>solve x^2 - 4 = 0</plaintext></subpod></pod>\
             <pod title='Result'><subpod><plaintext>x = -2 or x = 2</plaintext></subpod></pod>\
             </queryresult>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<queryresult success='false' error='false' numpods='0'></queryresult>",
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &format!("[math]\napp_id = \"APP-1\"\nbase_url = \"{}\"\n", server.uri()),
    );
    let root = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        examforge(&root)
            .args(["math", "--operation", "solve", "--config"])
            .arg(&config)
            .args(["x^2", "-", "4", "=", "0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Query: solve x^2 - 4 = 0"))
            .stdout(predicate::str::contains("x = -2 or x = 2"));

        examforge(&root)
            .args(["math", "--operation", "solve", "--config"])
            .arg(root.join("examforge.toml"))
            .arg("y = 3")
            .assert()
            .failure()
            .stderr(predicate::str::contains("no clear answer"));
    })
    .await
    .unwrap();
}

#[test]
fn math_requires_app_id() {
    let dir = TempDir::new().unwrap();
    examforge(dir.path())
        .args(["math", "2+2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no Wolfram|Alpha app id configured"));
}
