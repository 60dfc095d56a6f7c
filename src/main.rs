use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tutor::catalog;
use tutor::db::Database;
use tutor::explain::DEFAULT_LEVEL;
use tutor::ingest::{Ingestor, PdfChunker};
use tutor::models::{Difficulty, IngestRequest, QuestionType};
use tutor::resolver::{KeywordResolver, DEFAULT_PAGE_RESULTS};
use tutor::tutor::format_page_hits;
use tutor::{live_engine, live_tutor, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "tutor")]
#[command(about = "Java textbook tutor: quizzes, grading and concept explanations")]
struct Cli {
    /// Session whose pending question `quiz` sets and `answer` grades.
    #[arg(long, global = true, default_value = "cli")]
    session: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, chunk and index the textbook PDF.
    Ingest {
        /// Defaults to TEXTBOOK_PDF.
        #[arg(long)]
        pdf: Option<String>,
        #[arg(long)]
        max_pages: Option<usize>,
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Show how an input maps onto a chapter and retrieval query.
    Resolve { input: String },
    /// List the pages a keyword appears on.
    Pages {
        keyword: String,
        #[arg(long, default_value_t = DEFAULT_PAGE_RESULTS)]
        max_results: usize,
    },
    /// Generate a question and remember its answer for the session.
    Quiz {
        input: String,
        #[arg(long, default_value = "normal", value_parser = parse_difficulty)]
        difficulty: Difficulty,
        #[arg(long = "type", default_value = "multiple_choice", value_parser = parse_question_type)]
        question_type: QuestionType,
    },
    /// Grade an answer to the session's pending question.
    Answer { answer: String },
    /// Explain a concept from the textbook.
    Explain {
        input: String,
        #[arg(long, default_value = DEFAULT_LEVEL)]
        level: String,
    },
    /// Start a fresh session and print its id for `--session`.
    NewSession,
    /// Show the latest exchanges of the session.
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Explain a concept again, taking the learner's feedback into account.
    Reexplain {
        input: String,
        /// What was unclear about the previous explanation.
        #[arg(long)]
        feedback: String,
        #[arg(long, default_value = DEFAULT_LEVEL)]
        level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    match cli.command {
        Command::Ingest {
            pdf,
            max_pages,
            rebuild,
        } => {
            let pdf_path = pdf
                .or_else(|| config.textbook_pdf.as_ref().map(|p| p.display().to_string()))
                .ok_or_else(|| anyhow::anyhow!("no PDF given; pass --pdf or set TEXTBOOK_PDF"))?;

            let db = Database::new(&config).await?;
            let ingestor = Ingestor::new(db, PdfChunker::from_config(&config), live_engine(&config));
            let request = IngestRequest {
                pdf_path,
                max_pages,
                rebuild,
            };
            let result = ingestor
                .ingest(request, |status| {
                    println!(
                        "[{}] chunks={} {}",
                        status.stage,
                        status.chunk_count,
                        status.message.unwrap_or_default()
                    );
                })
                .await?;
            println!(
                "Ingest complete. skipped={} pages={} chunks={}",
                result.skipped, result.page_count, result.chunk_count
            );
        }
        Command::Resolve { input } => {
            let resolver = KeywordResolver::new(catalog::load(Some(&config.catalog_path()))?);
            println!("{}", serde_json::to_string_pretty(&resolver.resolve(&input))?);
        }
        Command::Pages {
            keyword,
            max_results,
        } => {
            let resolver = KeywordResolver::new(catalog::load(Some(&config.catalog_path()))?);
            let hits = resolver.search_pages(&keyword, max_results);
            println!("{}", format_page_hits(&keyword, &hits));
        }
        Command::Quiz {
            input,
            difficulty,
            question_type,
        } => {
            let tutor = live_tutor(&config, Database::new(&config).await?).await?;
            match tutor
                .generate_question(&cli.session, &input, difficulty, question_type)
                .await
            {
                Ok(turn) => println!("{}", turn.learner_text),
                Err(err) => {
                    tracing::error!("question generation failed: {err:#}");
                    println!("{}", err.user_message());
                }
            }
        }
        Command::Answer { answer } => {
            let tutor = live_tutor(&config, Database::new(&config).await?).await?;
            let result = tutor.evaluate_answer(&cli.session, &answer).await?;
            println!("{}", result.message);
        }
        Command::Explain { input, level } => {
            let tutor = live_tutor(&config, Database::new(&config).await?).await?;
            match tutor.explain_concept(&input, &level).await {
                Ok(explanation) => println!("{}", explanation.render()),
                Err(err) => {
                    tracing::error!("concept explanation failed: {err:#}");
                    println!("{}", err.user_message());
                }
            }
        }
        Command::NewSession => {
            let db = Database::new(&config).await?;
            println!("{}", db.create_session().await?);
        }
        Command::History { limit } => {
            let db = Database::new(&config).await?;
            for (role, content) in db.latest_messages(&cli.session, limit).await? {
                println!("[{role}] {content}\n");
            }
        }
        Command::Reexplain {
            input,
            feedback,
            level,
        } => {
            let tutor = live_tutor(&config, Database::new(&config).await?).await?;
            match tutor.reexplain_concept(&input, &feedback, &level).await {
                Ok(reexplanation) => println!("{}", reexplanation.render()),
                Err(err) => {
                    tracing::error!("concept re-explanation failed: {err:#}");
                    println!("{}", err.user_message());
                }
            }
        }
    }

    Ok(())
}

fn parse_difficulty(value: &str) -> Result<Difficulty, String> {
    Difficulty::parse(value).ok_or_else(|| format!("unknown difficulty: {value}"))
}

fn parse_question_type(value: &str) -> Result<QuestionType, String> {
    QuestionType::parse(value).ok_or_else(|| format!("unknown question type: {value}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
