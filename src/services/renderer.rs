use crate::error::{Result, SegmenterError};
use crate::types::{ApiConfig, PageImage, PromptSet, RenderOptions, RenderedDocument};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAIN_PROMPT: &str = "使用markdown语法，将图片中识别到的文字转换为markdown格式输出。你必须做到：
1. 输出和使用识别到的图片的相同的语言，例如，识别到英语的字段，输出的内容必须是英语。
2. 不要解释和输出无关的文字，直接输出图片中的内容。
3. 内容不要包含在```markdown ```中、段落公式使用 $$ $$ 的形式、行内公式使用 $ $ 的形式、忽略掉长直线、忽略掉页码。
再次强调，不要解释和输出无关的文字，直接输出图片中的内容。
";

pub const DEFAULT_REGION_PROMPT: &str = "图片中用红色框和名称标注出了一些区域。如果区域是表格或者图片，使用 ![]() 的形式插入到输出内容中，否则直接输出文字内容。
";

pub const DEFAULT_ROLE_PROMPT: &str = "你是一个PDF文档解析器，使用markdown和latex语法输出图片的内容。
";

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            main: DEFAULT_MAIN_PROMPT.to_string(),
            region: DEFAULT_REGION_PROMPT.to_string(),
            role: DEFAULT_ROLE_PROMPT.to_string(),
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            attempt_timeout: Duration::from_secs(120),
            max_retries: 1,
            prompts: PromptSet::default(),
        }
    }
}

/// Render every page through the external collaborator with a bounded worker
/// pool. Each page gets a per-attempt timeout and a bounded retry count; a
/// failing page never cancels its siblings. Results are written back by page
/// index, so output order does not depend on completion order, and a failed
/// page still gets its `PAGE_INDEX-<n>` marker (with an empty body) to keep
/// the page-index sequence continuous for downstream segmentation.
pub async fn render_document<F, Fut>(
    pages: Vec<PageImage>,
    options: &RenderOptions,
    render: F,
) -> RenderedDocument
where
    F: Fn(PageImage) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    info!(
        "rendering {} pages with {} workers",
        pages.len(),
        options.workers
    );

    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut tasks = JoinSet::new();
    let spawned: Vec<usize> = pages.iter().map(|p| p.page_index).collect();

    for page in pages {
        let semaphore = semaphore.clone();
        let render = render.clone();
        let attempt_timeout = options.attempt_timeout;
        let max_retries = options.max_retries;

        tasks.spawn(async move {
            // Holds a worker slot for the whole attempt sequence.
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let page_index = page.page_index;
            let outcome = render_with_retries(page, attempt_timeout, max_retries, render).await;
            (page_index, outcome)
        });
    }

    let mut outcomes: Vec<(usize, std::result::Result<String, String>)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!("render task panicked: {}", e),
        }
    }
    // A panicked task never reports its outcome; its page still needs a
    // marker and a failure entry to keep the page-index sequence continuous.
    for page_index in spawned {
        if !outcomes.iter().any(|(i, _)| *i == page_index) {
            outcomes.push((page_index, Err("render task panicked".to_string())));
        }
    }
    outcomes.sort_by_key(|(page_index, _)| *page_index);

    let mut rendered = Vec::with_capacity(outcomes.len());
    let mut failed_pages = Vec::new();
    for (page_index, outcome) in outcomes {
        match outcome {
            Ok(content) => {
                rendered.push(format!("\nPAGE_INDEX-{}\n{}", page_index, content));
            }
            Err(reason) => {
                warn!("page {} failed after retries: {}", page_index, reason);
                rendered.push(format!("\nPAGE_INDEX-{}\n", page_index));
                failed_pages.push((page_index, reason));
            }
        }
    }

    RenderedDocument {
        content: rendered.join("\n\n"),
        failed_pages,
    }
}

async fn render_with_retries<F, Fut>(
    page: PageImage,
    attempt_timeout: Duration,
    max_retries: usize,
    render: F,
) -> std::result::Result<String, String>
where
    F: Fn(PageImage) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut last_error = String::new();

    for attempt in 0..=max_retries {
        match tokio::time::timeout(attempt_timeout, render(page.clone())).await {
            Ok(Ok(content)) => return Ok(strip_markdown_fence(&content)),
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {:?}", attempt_timeout),
        }
        debug!(
            "page {} attempt {} failed: {}",
            page.page_index, attempt, last_error
        );
    }

    Err(last_error)
}

/// Models still wrap output in ```` ```markdown ```` fences from time to
/// time; strip the opening fence and the last closing one.
pub fn strip_markdown_fence(content: &str) -> String {
    if !content.contains("```markdown") {
        return content.to_string();
    }
    let without_open = content.replace("```markdown\n", "");
    match without_open.rfind("```") {
        Some(pos) => {
            let mut stripped = without_open;
            stripped.replace_range(pos..pos + 3, "");
            stripped
        }
        None => without_open,
    }
}

/// Concrete page renderer: posts the page image as a base64 data URL to an
/// OpenAI-style vision endpoint. Region images are referenced by name inside
/// the prompt rather than attached.
pub struct HttpPageRenderer {
    client: reqwest::Client,
    config: ApiConfig,
    prompts: PromptSet,
}

impl HttpPageRenderer {
    pub fn new(config: ApiConfig, prompts: PromptSet) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            prompts,
        })
    }

    pub async fn render_page(&self, page: PageImage) -> Result<String> {
        let mut prompt = self.prompts.main.clone();
        if !page.region_names.is_empty() {
            prompt.push_str(&self.prompts.region);
            prompt.push_str(&page.region_names.join(", "));
        }

        let image_bytes = tokio::fs::read(&page.image_path).await?;
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(image_bytes));

        let request = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": self.prompts.role },
                { "role": "user", "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ]},
            ],
        });

        let response: serde_json::Value = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SegmenterError::PageRender {
                page_index: page.page_index,
                reason: "reply carried no message content".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page(index: usize) -> PageImage {
        PageImage {
            page_index: index,
            image_path: PathBuf::from(format!("{}.png", index)),
            region_names: Vec::new(),
        }
    }

    fn options() -> RenderOptions {
        RenderOptions {
            workers: 2,
            attempt_timeout: Duration::from_secs(5),
            max_retries: 1,
            ..RenderOptions::default()
        }
    }

    #[tokio::test]
    async fn pages_are_assembled_in_index_order() {
        let pages = vec![page(0), page(1), page(2)];
        let doc = render_document(pages, &options(), |p| async move {
            // Later pages finish first.
            tokio::time::sleep(Duration::from_millis(30 - 10 * p.page_index as u64)).await;
            Ok(format!("content-{}", p.page_index))
        })
        .await;

        assert!(doc.failed_pages.is_empty());
        assert_eq!(
            doc.content,
            "\nPAGE_INDEX-0\ncontent-0\n\n\nPAGE_INDEX-1\ncontent-1\n\n\nPAGE_INDEX-2\ncontent-2"
        );
    }

    #[tokio::test]
    async fn failing_page_does_not_cancel_siblings() {
        let pages = vec![page(0), page(1), page(2)];
        let doc = render_document(pages, &options(), |p| async move {
            if p.page_index == 1 {
                Err(SegmenterError::PageRender {
                    page_index: 1,
                    reason: "boom".to_string(),
                })
            } else {
                Ok(format!("content-{}", p.page_index))
            }
        })
        .await;

        assert_eq!(doc.failed_pages.len(), 1);
        assert_eq!(doc.failed_pages[0].0, 1);
        // The failed page keeps its marker so page-index continuity survives.
        assert!(doc.content.contains("\nPAGE_INDEX-1\n"));
        assert!(doc.content.contains("content-0"));
        assert!(doc.content.contains("content-2"));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

        let doc = render_document(vec![page(0)], &options(), |p| async move {
            if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SegmenterError::PageRender {
                    page_index: p.page_index,
                    reason: "transient".to_string(),
                })
            } else {
                Ok("recovered".to_string())
            }
        })
        .await;

        assert!(doc.failed_pages.is_empty());
        assert!(doc.content.contains("recovered"));
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_page_keeps_its_marker_and_is_reported() {
        let pages = vec![page(0), page(1), page(2)];
        let doc = render_document(pages, &options(), |p| async move {
            if p.page_index == 1 {
                panic!("renderer blew up");
            }
            Ok(format!("content-{}", p.page_index))
        })
        .await;

        assert_eq!(doc.failed_pages.len(), 1);
        assert_eq!(doc.failed_pages[0].0, 1);
        assert!(doc.failed_pages[0].1.contains("panicked"));
        assert!(doc.content.contains("\nPAGE_INDEX-1\n"));
        assert!(doc.content.contains("content-0"));
        assert!(doc.content.contains("content-2"));
    }

    #[tokio::test]
    async fn slow_attempt_times_out_and_fails() {
        let opts = RenderOptions {
            workers: 1,
            attempt_timeout: Duration::from_millis(10),
            max_retries: 0,
            ..RenderOptions::default()
        };
        let doc = render_document(vec![page(0)], &opts, |_| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        })
        .await;

        assert_eq!(doc.failed_pages.len(), 1);
        assert!(doc.failed_pages[0].1.contains("timed out"));
    }

    #[test]
    fn markdown_fences_are_stripped() {
        let fenced = "```markdown\n# Title\ncontent\n```";
        assert_eq!(strip_markdown_fence(fenced), "# Title\ncontent\n");

        let plain = "# Title\ncontent";
        assert_eq!(strip_markdown_fence(plain), plain);
    }
}
