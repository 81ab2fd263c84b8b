//! Browser front end: one page with an upload form and a question form.
//! Each form posts to a handler that runs one coordinator action.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use talking_pdfs_core::{
    Answer, ChatModel, Embedder, IngestError, PdfUpload, PipelineError, QaCoordinator,
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState<E, C>
where
    E: Embedder,
    C: ChatModel,
{
    qa: Arc<QaCoordinator<E, C>>,
    /// Actions run one at a time, matching the single-user model.
    busy: Arc<Mutex<()>>,
}

impl<E, C> Clone for AppState<E, C>
where
    E: Embedder,
    C: ChatModel,
{
    fn clone(&self) -> Self {
        Self {
            qa: Arc::clone(&self.qa),
            busy: Arc::clone(&self.busy),
        }
    }
}

impl<E, C> AppState<E, C>
where
    E: Embedder,
    C: ChatModel,
{
    pub fn new(qa: Arc<QaCoordinator<E, C>>) -> Self {
        Self {
            qa,
            busy: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router<E, C>(state: AppState<E, C>, max_upload_bytes: usize) -> Router
where
    E: Embedder + 'static,
    C: ChatModel + 'static,
{
    Router::new()
        .route("/", get(index_page))
        .route(
            "/process",
            post(process_documents::<E, C>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/ask", post(ask_question::<E, C>))
        .route("/api/status", get(status::<E, C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<E, C>(
    qa: Arc<QaCoordinator<E, C>>,
    addr: SocketAddr,
    max_upload_bytes: usize,
) -> anyhow::Result<()>
where
    E: Embedder + 'static,
    C: ChatModel + 'static,
{
    let app = router(AppState::new(qa), max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving talking-pdfs");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

enum Notice {
    Success(String),
    Failure(String),
}

async fn index_page() -> Html<String> {
    render_page(None, None, "")
}

async fn process_documents<E, C>(
    State(state): State<AppState<E, C>>,
    mut multipart: Multipart,
) -> Response
where
    E: Embedder + 'static,
    C: ChatModel + 'static,
{
    let mut uploads = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => {
                return page_with_error(StatusCode::BAD_REQUEST, error.body_text(), "");
            }
        };

        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        match field.bytes().await {
            Ok(bytes) if !bytes.is_empty() => uploads.push(PdfUpload::new(name, bytes.to_vec())),
            Ok(_) => {}
            Err(error) => {
                return page_with_error(StatusCode::BAD_REQUEST, error.body_text(), "");
            }
        }
    }

    info!(documents = uploads.len(), "received uploads");
    let _guard = state.busy.lock().await;
    match state.qa.process_documents(&uploads).await {
        Ok(report) => {
            let message = format!(
                "Done! {} document(s), {} chunk(s) indexed. Your PDFs have been processed. \
                 You can now ask questions about them.",
                report.documents.len(),
                report.chunks
            );
            (StatusCode::OK, render_page(Some(Notice::Success(message)), None, "")).into_response()
        }
        Err(error) => {
            warn!(%error, "processing failed");
            page_with_error(status_for(&error), error.to_string(), "")
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskForm {
    question: String,
}

async fn ask_question<E, C>(
    State(state): State<AppState<E, C>>,
    Form(form): Form<AskForm>,
) -> Response
where
    E: Embedder + 'static,
    C: ChatModel + 'static,
{
    let _guard = state.busy.lock().await;
    match state.qa.answer_question(&form.question).await {
        Ok(answer) => (StatusCode::OK, render_page(None, Some(&answer), &form.question)).into_response(),
        Err(error) => {
            warn!(%error, "question failed");
            page_with_error(status_for(&error), error.to_string(), &form.question)
        }
    }
}

async fn status<E, C>(State(state): State<AppState<E, C>>) -> Response
where
    E: Embedder + 'static,
    C: ChatModel + 'static,
{
    match state.qa.index_state().await {
        Ok(index_state) => Json(index_state).into_response(),
        Err(error) => (
            status_for(&error),
            Json(serde_json::json!({ "error": error.to_string() })),
        )
            .into_response(),
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::IndexNotFound => StatusCode::CONFLICT,
        PipelineError::InvalidQuestion(_)
        | PipelineError::Ingest(IngestError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
        PipelineError::Ingest(IngestError::PdfParse { .. })
        | PipelineError::Ingest(IngestError::NoText) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Service(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn page_with_error(status: StatusCode, message: String, question: &str) -> Response {
    (status, render_page(Some(Notice::Failure(message)), None, question)).into_response()
}

fn render_page(notice: Option<Notice>, answer: Option<&Answer>, question: &str) -> Html<String> {
    let notice = match notice {
        Some(Notice::Success(message)) => {
            format!(r#"<p class="notice success">{}</p>"#, escape_html(&message))
        }
        Some(Notice::Failure(message)) => {
            format!(r#"<p class="notice error">{}</p>"#, escape_html(&message))
        }
        None => String::new(),
    };
    let reply = answer
        .map(|answer| {
            format!(
                r#"<section class="reply"><h2>Reply</h2><p>{}</p></section>"#,
                escape_html(answer.text.trim()).replace('\n', "<br>")
            )
        })
        .unwrap_or_default();

    Html(format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>TalkingPDFs</title>
<style>
body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }}
.notice {{ padding: .5rem 1rem; border-radius: .25rem; }}
.success {{ background: #e6f4ea; }}
.error {{ background: #fce8e6; }}
input[type=text] {{ width: 100%; }}
</style>
</head>
<body>
<h1>Talk to the PDFs &#128218;</h1>
{notice}
<form action="/ask" method="post">
<label for="question">Ask a Question from the PDF files:</label>
<input type="text" id="question" name="question" value="{question}">
<button type="submit">Ask</button>
</form>
{reply}
<h2>Your documents</h2>
<form action="/process" method="post" enctype="multipart/form-data">
<label for="files">Upload your PDFs here and click on 'Process'</label>
<input type="file" id="files" name="files" accept="application/pdf,.pdf" multiple>
<button type="submit">Process</button>
</form>
</body>
</html>
"#,
        question = escape_html(question),
    ))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use talking_pdfs_core::testing::pdf_with_pages;
    use talking_pdfs_core::{
        AppConfig, CharacterNgramEmbedder, IndexState, ServiceError, VectorIndex,
    };
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct EchoChat;

    #[async_trait]
    impl ChatModel for EchoChat {
        fn model(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
            let context = prompt
                .split("Context: ")
                .nth(1)
                .and_then(|rest| rest.split("\n\nQuestion: ").next())
                .unwrap_or_default();
            Ok(format!("From the documents: {}", context.trim()))
        }
    }

    fn app(dir: &TempDir) -> Router {
        let config = AppConfig {
            index_dir: dir.path().join("faiss_index"),
            ..AppConfig::default()
        };
        let qa = QaCoordinator::new(&config, CharacterNgramEmbedder::default(), EchoChat)
            .expect("coordinator");
        router(AppState::new(Arc::new(qa)), 1024 * 1024)
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn ask(question: &str) -> Request<Body> {
        Request::post("/ask")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("question={}", question.replace(' ', "+"))))
            .expect("request")
    }

    const BOUNDARY: &str = "talkingpdfsboundary";

    fn upload(filename: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        multipart(body)
    }

    fn multipart(body: Vec<u8>) -> Request<Body> {
        Request::post("/process")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn index_page_has_both_forms() {
        let dir = tempdir().expect("tempdir");
        let response = app(&dir)
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(r#"action="/ask""#));
        assert!(html.contains(r#"action="/process""#));
    }

    #[tokio::test]
    async fn asking_before_processing_is_a_conflict_with_guidance() {
        let dir = tempdir().expect("tempdir");
        let response = app(&dir)
            .oneshot(ask("What is the capital of France?"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_text(response).await.contains("no documents processed yet"));
    }

    #[tokio::test]
    async fn answers_are_rendered_escaped() {
        let dir = tempdir().expect("tempdir");
        let embedder = CharacterNgramEmbedder::default();
        let text = "The capital of France is <b>Paris</b>.".to_string();
        let index = VectorIndex::build(
            "local/char-trigram",
            vec![text.clone()],
            vec![embedder.embed_one(&text)],
            Vec::new(),
        )
        .expect("index");
        index
            .save(&dir.path().join("faiss_index"))
            .await
            .expect("save");

        let response = app(&dir)
            .oneshot(ask("What is the capital of France?"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("&lt;b&gt;Paris&lt;/b&gt;"));
        assert!(html.contains(r#"value="What is the capital of France?""#));
    }

    #[tokio::test]
    async fn malformed_upload_is_unprocessable() {
        let dir = tempdir().expect("tempdir");
        let response = app(&dir)
            .oneshot(upload("broken.pdf", b"%PDF-1.4\n%broken"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(response).await.contains("broken.pdf"));
    }

    #[tokio::test]
    async fn uploaded_pdfs_are_processed_and_answered() {
        let dir = tempdir().expect("tempdir");
        let app = app(&dir);

        let pdf = pdf_with_pages(&["The capital of France is Paris."]);
        let response = app
            .clone()
            .oneshot(upload("france.pdf", &pdf))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Done!"), "page was {html}");
        assert!(html.contains("1 document(s)"));

        let index_state = talking_pdfs_core::index::index_state(&dir.path().join("faiss_index"))
            .await
            .expect("index state");
        assert!(matches!(index_state, IndexState::Ready { chunks: 1, .. }));

        let response = app
            .oneshot(ask("What is the capital of France?"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Paris"));
    }

    #[tokio::test]
    async fn form_without_files_is_a_bad_request() {
        let dir = tempdir().expect("tempdir");
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nno files here\r\n--{BOUNDARY}--\r\n"
        );
        let response = app(&dir)
            .oneshot(multipart(body.into_bytes()))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("no documents were uploaded"));
    }

    #[tokio::test]
    async fn status_reports_empty_index() {
        let dir = tempdir().expect("tempdir");
        let response = app(&dir)
            .oneshot(Request::get("/api/status").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(json["state"], "empty");
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
