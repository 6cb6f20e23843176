use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use distill_core::Config;
use distill_llm::normalize::normalize_response;
use distill_llm::{
    create_provider, image_mime_for_path, Conversation, ImageInput, LlmProvider, Message,
    ResponseFormat,
};
use distill_summarize::{PipelineConfig, SummaryPipeline, UsageRecord};

use crate::cli::{AskArgs, ChatArgs, SummarizeArgs, SummaryTuning};
use crate::terminal::{ReplInput, Terminal};
use crate::web;

const SUMMARY_FAILURE: &str =
    "I am not able to summarize this content at the moment. Please try again later.";
const REQUEST_FAILURE: &str =
    "I am not able to process your request at the moment. Please try again later.";

const DEFAULT_CHAT_PROMPT: &str = "\
#Role:
    You are a helpful assistant with broad knowledge.

#Instructions:
    1. Be polite, accurate and helpful.
    2. Do not hallucinate; give correct answers with clear examples.
    3. Use headings and bullet points only when they help readability.
";

const DEFAULT_ASK_PROMPT: &str = "\
#Role:
    You are a helpful assistant who answers user queries on a wide range of topics.

#Instructions:
    1. Analyze the query and answer it correctly. Do not hallucinate.
    2. Use headings and bullet points only when they are needed.
    3. When an image is attached, answer from what the image shows in 100 to 200 words.

#Response Format:
    Reply with a JSON object of the form {\"response\": \"your answer\"}.
    The answer is a single string; it may contain line breaks and markdown.
";

// ── summarize ─────────────────────────────────────────────────

pub async fn summarize(config: &Config, args: SummarizeArgs, terminal: &Terminal) -> Result<()> {
    let document = match &args.url {
        Some(url) => web::fetch_text(url, config.llm.timeout_secs).await?,
        None => read_document(args.file.as_deref(), args.text.as_deref())?,
    };
    if document.trim().is_empty() {
        bail!("nothing to summarize: the document is empty");
    }

    let pipeline = build_pipeline(config, &args.tuning)?;

    let result = {
        let _spinner = if args.json {
            None
        } else {
            Some(terminal.start_spinner("Summarizing...")?)
        };
        pipeline.run(&document).await
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "summary run failed");
            bail!(SUMMARY_FAILURE);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if args.show_chunks {
        terminal.print_chunk_summaries(&report.chunk_summaries)?;
    }
    println!("{}", report.combined);
    if args.show_usage {
        terminal.print_usage_records(&report.usage)?;
        terminal.print_info(&format!("total: {}", report.total_usage()))?;
    }
    Ok(())
}

fn read_document(file: Option<&Path>, text: Option<&str>) -> Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read document: {}", path.display()));
    }
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read document from stdin")?;
    Ok(buf)
}

fn build_pipeline(config: &Config, tuning: &SummaryTuning) -> Result<SummaryPipeline> {
    let mut pipeline_config =
        PipelineConfig::from_config(config).context("failed to load summary prompts")?;
    if let Some(size) = tuning.chunk_size {
        pipeline_config.chunker.max_size = size;
    }
    if let Some(overlap) = tuning.overlap {
        pipeline_config.chunker.overlap = overlap;
    }
    if let Some(concurrency) = tuning.concurrency {
        pipeline_config.concurrency = concurrency.max(1);
    }

    let provider = create_provider(&config.llm, ResponseFormat::Text)
        .context("failed to create LLM provider")?;
    SummaryPipeline::new(provider, pipeline_config).context("invalid chunking settings")
}

// ── chat ──────────────────────────────────────────────────────

pub async fn chat(config: &Config, args: ChatArgs, terminal: &Terminal) -> Result<()> {
    if args.summarize {
        return summary_loop(config, &args.tuning, terminal).await;
    }

    let system_prompt = match (&args.system_prompt, &args.system_prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read system prompt: {}", path.display()))?,
        (None, None) => DEFAULT_CHAT_PROMPT.to_string(),
    };

    let provider = create_provider(&config.llm, ResponseFormat::Text)
        .context("failed to create LLM provider")?;
    let mut conversation = Conversation::new().with_system_prompt(system_prompt);

    terminal.print_banner("chat", provider.name(), config.llm.model())?;

    loop {
        match terminal.read_input()? {
            ReplInput::Exit => {
                terminal.print_info("Thank you for chatting. Goodbye.")?;
                break;
            }
            ReplInput::Empty => continue,
            ReplInput::History => terminal.print_history(conversation.messages())?,
            ReplInput::Tokens => terminal.print_turn_usage(conversation.usage_log())?,
            ReplInput::Text(input) => {
                let reply = {
                    let _spinner = terminal.start_spinner("thinking")?;
                    conversation
                        .send(
                            provider.as_ref(),
                            &input,
                            config.llm.temperature,
                            config.llm.max_tokens,
                        )
                        .await
                };
                match reply {
                    Ok(text) => terminal.print_assistant(&text)?,
                    Err(e) => {
                        error!(error = %e, "chat turn failed");
                        terminal.print_error(REQUEST_FAILURE)?;
                    }
                }
            }
        }
    }

    info!(turns = conversation.turns(), "chat session ended");
    Ok(())
}

/// Summary bot: every input is run through the pipeline on its own.
async fn summary_loop(config: &Config, tuning: &SummaryTuning, terminal: &Terminal) -> Result<()> {
    let pipeline = build_pipeline(config, tuning)?;
    let mut history: Vec<Message> = Vec::new();
    let mut usage: Vec<UsageRecord> = Vec::new();

    terminal.print_banner("summary bot", &config.llm.provider, config.llm.model())?;

    loop {
        match terminal.read_input()? {
            ReplInput::Exit => {
                terminal.print_info("Thank you for using the summary bot. Goodbye.")?;
                break;
            }
            ReplInput::Empty => continue,
            ReplInput::History => terminal.print_history(&history)?,
            ReplInput::Tokens => terminal.print_usage_records(&usage)?,
            ReplInput::Text(input) => {
                let result = {
                    let _spinner = terminal.start_spinner("Summarizing...")?;
                    pipeline.run(&input).await
                };
                match result {
                    Ok(report) => {
                        terminal.print_assistant(&report.combined)?;
                        history.push(Message::user(input));
                        history.push(Message::assistant(report.combined));
                        usage.extend(report.usage);
                    }
                    Err(e) => {
                        error!(error = %e, "summary run failed");
                        terminal.print_error(SUMMARY_FAILURE)?;
                    }
                }
            }
        }
    }
    Ok(())
}

// ── ask ───────────────────────────────────────────────────────

pub async fn ask(config: &Config, args: AskArgs) -> Result<()> {
    let provider = create_provider(&config.llm, ResponseFormat::Json)
        .context("failed to create LLM provider")?;
    let instruction = args.system_prompt.as_deref().unwrap_or(DEFAULT_ASK_PROMPT);
    let image = args.image.as_deref().map(load_image).transpose()?;

    let answer = ask_once(
        provider.as_ref(),
        instruction,
        &args.query,
        image,
        &args.json_field,
        config.llm.temperature,
        config.llm.max_tokens,
    )
    .await;

    match answer {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "ask failed");
            bail!(REQUEST_FAILURE);
        }
    }
}

fn load_image(path: &Path) -> Result<ImageInput> {
    let Some(mime_type) = image_mime_for_path(path) else {
        bail!("unsupported image type: {} (use png, jpg, jpeg, webp or gif)", path.display());
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image: {}", path.display()))?;
    Ok(ImageInput::from_bytes(&bytes, mime_type))
}

async fn ask_once(
    provider: &dyn LlmProvider,
    instruction: &str,
    query: &str,
    image: Option<ImageInput>,
    field: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String, distill_llm::LlmError> {
    let mut input = Message::user(format!("User query: {}", query));
    if let Some(image) = image {
        input = input.with_image(image);
    }
    let messages = vec![Message::system(instruction), input];
    let completion = provider.complete(messages, temperature, max_tokens).await?;
    let normalized = normalize_response(&completion.text, field);
    if normalized.structured.is_none() {
        warn!("reply was not JSON, printing raw text");
    }
    Ok(normalized.text)
}

// ── config ────────────────────────────────────────────────────

pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
    println!("profiles: {}", Config::available_profiles().join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use async_trait::async_trait;
    use distill_llm::{Completion, LlmError, Usage};

    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn complete(
            &self,
            messages: Vec<Message>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<Completion, LlmError> {
            assert_eq!(messages[1].content, "User query: hi");
            let text = match messages[1].images.first() {
                Some(image) => format!("{{\"response\": \"saw {}\"}}", image.mime_type),
                None => self.0.to_string(),
            };
            Ok(Completion { text, usage: Some(Usage::default()) })
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn ask_extracts_json_field() {
        let provider = Canned("```json\n{\"response\": \"Hello!\"}\n```");
        let text = ask_once(&provider, DEFAULT_ASK_PROMPT, "hi", None, "response", 0.7, 100)
            .await
            .unwrap();
        assert_eq!(text, "Hello!");
    }

    #[tokio::test]
    async fn ask_falls_back_to_raw_text() {
        let provider = Canned("Just plain prose.");
        let text = ask_once(&provider, DEFAULT_ASK_PROMPT, "hi", None, "response", 0.7, 100)
            .await
            .unwrap();
        assert_eq!(text, "Just plain prose.");
    }

    #[tokio::test]
    async fn ask_sends_attached_image() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"png-bytes").unwrap();
        let image = load_image(file.path()).unwrap();
        assert_eq!(image.mime_type, "image/png");

        let provider = Canned("unused");
        let text = ask_once(&provider, DEFAULT_ASK_PROMPT, "hi", Some(image), "response", 0.7, 100)
            .await
            .unwrap();
        assert_eq!(text, "saw image/png");
    }

    #[test]
    fn unsupported_image_type_is_rejected() {
        let file = tempfile::Builder::new().suffix(".bmp").tempfile().unwrap();
        assert!(load_image(file.path()).is_err());
    }

    #[test]
    fn document_from_file_or_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "file body").unwrap();

        assert_eq!(read_document(Some(file.path()), None).unwrap(), "file body");
        assert_eq!(read_document(None, Some("inline")).unwrap(), "inline");
        assert!(read_document(Some(Path::new("/nonexistent/doc.txt")), None).is_err());
    }

    #[test]
    fn tuning_overrides_config() {
        let mut config = Config::for_profile("CLITESTA");
        config.llm.provider = "ollama".into();
        let tuning = SummaryTuning {
            chunk_size: Some(900),
            overlap: Some(150),
            concurrency: Some(0),
        };
        let pipeline = build_pipeline(&config, &tuning).unwrap();
        assert_eq!(pipeline.splitter().config().max_size, 900);
        assert_eq!(pipeline.splitter().config().overlap, 150);
    }

    #[test]
    fn bad_tuning_is_rejected() {
        let mut config = Config::for_profile("CLITESTB");
        config.llm.provider = "ollama".into();
        let tuning = SummaryTuning { chunk_size: Some(100), overlap: Some(100), concurrency: None };
        assert!(build_pipeline(&config, &tuning).is_err());
    }
}
