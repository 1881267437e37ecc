use clap::{Parser, Subcommand};
use console::style;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use mentor_config::{ConfigLoader, MentorConfig};
use mentor_core::{MentorError, MnemonicDevice, Result, SessionState, Stage};
use mentor_oracle::{OpenAiEmbedding, OpenAiOracle};
use mentor_runtime::Orchestrator;
use mentor_store::{SqliteConceptSearch, SqliteStore};

/// 🦉 Mentor - agentic tutoring session orchestrator
#[derive(Parser)]
#[command(name = "mentor", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to mentor.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and work through the tutoring session
    Ask {
        /// The question to learn about
        question: String,
        /// What you already understand about the topic
        #[arg(short, long)]
        understanding: Option<String>,
        /// Stop at the comprehension check instead of prompting for answers
        #[arg(long)]
        no_input: bool,
    },
    /// Run a one-shot assessment of an answer
    Practice {
        /// The practice prompt
        question: String,
    },
    /// Show learning progress and suggested next topics
    Progress,
    /// Show topics due for review
    Review,
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Initialize a new mentor.toml
    Init {
        /// Create in the current directory instead of ~/.mentor/
        #[arg(long)]
        local: bool,
    },
}

/// Stable per-invocation identifiers, overridable via env for persistent
/// learner profiles.
struct SessionIds {
    learner: Uuid,
    goal: Uuid,
    tenant: Uuid,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let loader = ConfigLoader::load(self.config.as_deref())?;
        let config = loader.get();

        self.init_tracing(&config);

        match self.command {
            Commands::Init { local } => {
                let path = if local {
                    PathBuf::from("mentor.toml")
                } else {
                    ConfigLoader::resolve_path(None)
                };
                ConfigLoader::write_default(&path)?;
                println!("{} wrote {}", style("✓").green(), path.display());
                Ok(())
            }
            Commands::Config { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    let rendered = toml::to_string_pretty(&config)
                        .map_err(|e| MentorError::Config(e.to_string()))?;
                    println!("{rendered}");
                }
                Ok(())
            }
            Commands::Ask {
                ref question,
                ref understanding,
                no_input,
            } => {
                let orchestrator = build_orchestrator(&config)?;
                let ids = session_ids();
                let mut state = orchestrator
                    .run(
                        ids.learner,
                        ids.goal,
                        ids.tenant,
                        question.clone(),
                        understanding.clone(),
                    )
                    .await?;
                render_session(&state);

                while state.stage == Stage::AwaitingResponse && !no_input {
                    let answer = prompt_answer()?;
                    if answer.is_empty() {
                        break;
                    }
                    state = orchestrator.resume(state, answer).await?;
                    render_session(&state);
                }
                Ok(())
            }
            Commands::Practice { ref question } => {
                let orchestrator = build_orchestrator(&config)?;
                let ids = session_ids();
                let state = orchestrator
                    .run(ids.learner, ids.goal, ids.tenant, question.clone(), None)
                    .await?;
                render_session(&state);
                Ok(())
            }
            Commands::Progress => {
                let orchestrator = build_orchestrator(&config)?;
                let ids = session_ids();
                let state = orchestrator
                    .run(
                        ids.learner,
                        ids.goal,
                        ids.tenant,
                        "show my overall learning progress",
                        None,
                    )
                    .await?;
                render_progress(&state);
                Ok(())
            }
            Commands::Review => {
                let orchestrator = build_orchestrator(&config)?;
                let ids = session_ids();
                let state = orchestrator
                    .run(
                        ids.learner,
                        ids.goal,
                        ids.tenant,
                        "what topics should I review",
                        None,
                    )
                    .await?;
                render_review(&state);
                Ok(())
            }
        }
    }

    fn init_tracing(&self, config: &MentorConfig) {
        let level = if self.quiet {
            "error".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };

        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

        if config.logging.format == "json" {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn env_uuid(var: &str) -> Option<Uuid> {
    std::env::var(var).ok().and_then(|v| Uuid::parse_str(&v).ok())
}

fn session_ids() -> SessionIds {
    SessionIds {
        learner: env_uuid("MENTOR_LEARNER_ID").unwrap_or_else(Uuid::new_v4),
        goal: env_uuid("MENTOR_GOAL_ID").unwrap_or_else(Uuid::new_v4),
        tenant: env_uuid("MENTOR_TENANT_ID").unwrap_or_else(Uuid::nil),
    }
}

fn build_orchestrator(config: &MentorConfig) -> Result<Orchestrator> {
    let api_key = config.oracle.api_key.clone().ok_or_else(|| {
        MentorError::Config("oracle.api_key not set (or OPENAI_API_KEY env)".into())
    })?;

    let oracle = OpenAiOracle::new(api_key.clone(), config.oracle.model.clone())
        .with_base_url(config.oracle.base_url.clone())
        .with_timeout_secs(config.oracle.request_timeout_secs);

    let store = Arc::new(SqliteStore::open(&config.store.db_path)?);

    let embedder = config.search.embedding_model.as_ref().map(|model| {
        Arc::new(
            OpenAiEmbedding::new(api_key)
                .with_model(model.clone(), config.search.embedding_dims)
                .with_base_url(config.oracle.base_url.clone()),
        ) as Arc<dyn mentor_oracle::EmbeddingProvider>
    });
    let search = Arc::new(SqliteConceptSearch::new(Arc::clone(&store), embedder));

    Orchestrator::new(Arc::new(oracle), store, search, config.clone())
}

fn prompt_answer() -> Result<String> {
    print!("{} ", style("Your answer ›").cyan().bold());
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn render_session(state: &SessionState) {
    println!();
    if let Some(ref explanation) = state.explanation {
        if !explanation.is_empty() {
            println!("{}", style("── Explanation ──").bold());
            println!("{explanation}\n");
        }
    }

    if let Some(ref device) = state.mnemonic_device {
        println!("{}", style("── Memory aid ──").bold());
        render_mnemonic(device);
        println!();
    }

    if state.stage == Stage::AwaitingResponse && !state.comprehension_questions.is_empty() {
        println!("{}", style("── Check your understanding ──").bold());
        for (i, question) in state.comprehension_questions.iter().enumerate() {
            println!("{}. {}", i + 1, question.text);
        }
        println!();
    }

    if let Some(result) = state.assessment_result {
        let label = match result {
            mentor_core::AssessmentResult::FullyUnderstood => style("fully understood").green(),
            mentor_core::AssessmentResult::PartiallyUnderstood => {
                style("partially understood").yellow()
            }
            mentor_core::AssessmentResult::NotUnderstood => style("not understood").red(),
        };
        println!("Assessment: {label}");
        if let Some(ref details) = state.assessment_details {
            println!("  {details}");
        }
    }

    if state.stage == Stage::Finalized && !state.knowledge_gaps.is_empty() {
        println!("{}", style("Recorded knowledge gaps:").bold());
        for gap in &state.knowledge_gaps {
            println!("  - {}", gap.description);
        }
    }

    if let Some(ref error) = state.error_message {
        println!("{} {error}", style("⚠").yellow());
    }
}

fn render_mnemonic(device: &MnemonicDevice) {
    match device {
        MnemonicDevice::Acronym {
            acronym, memory_tip, ..
        } => {
            println!("{}: {memory_tip}", style(acronym).bold());
        }
        MnemonicDevice::ComparisonTable { title, items, .. } => {
            println!("{}: {}", style(title).bold(), items.join(" | "));
        }
        MnemonicDevice::Analogy { analogy, explanation, .. } => {
            println!("Think of it as {analogy} - {explanation}");
        }
        MnemonicDevice::Visual { description, .. } => {
            println!("{description}");
        }
        MnemonicDevice::NumberPattern { memory_phrase, pattern, .. } => {
            println!("{memory_phrase} ({pattern})");
        }
    }
}

fn render_progress(state: &SessionState) {
    println!();
    println!("{}", style("── Learning progress ──").bold());
    if let Some(ref metrics) = state.efficiency {
        println!("Topics mastered: {}", metrics.total_mastered);
        println!("Open knowledge gaps: {}", metrics.open_gaps);
        println!("Pace: {}", metrics.pace);
    } else {
        println!("No progress data yet.");
    }
    if !state.suggested_topics.is_empty() {
        println!("\n{}", style("Suggested next topics:").bold());
        for topic in &state.suggested_topics {
            println!("  - {}", topic.name);
        }
    }
    if let Some(ref error) = state.error_message {
        println!("{} {error}", style("⚠").yellow());
    }
}

fn render_review(state: &SessionState) {
    println!();
    println!("{}", style("── Review reminders ──").bold());
    if state.review_reminders.is_empty() {
        println!("Nothing is due for review.");
    }
    for reminder in &state.review_reminders {
        println!(
            "  - topic {} - last reviewed {} day(s) ago (urgency {:.1})",
            reminder.topic_id, reminder.days_since_review, reminder.urgency
        );
    }
    if let Some(ref error) = state.error_message {
        println!("{} {error}", style("⚠").yellow());
    }
}
