use clap::{Parser, Subcommand};
use repolens::Result;
use repolens::cache::ArtifactKind;
use repolens::commands::{
    clear_repository, index_repository, run_query, search_issues, show_artifact,
    show_cache_status, show_config, show_issues, show_repository,
};

#[derive(Parser)]
#[command(name = "repolens")]
#[command(about = "A caching analytics backend for GitHub repository issues")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show repository metadata (open issues, contributors, stars)
    Repo {
        /// Repository in owner/name form
        repo: String,
        /// Bypass the cache and refetch
        #[arg(long)]
        force: bool,
    },
    /// Show the repository's issues
    Issues {
        /// Repository in owner/name form
        repo: String,
        /// Bypass the cache and refetch
        #[arg(long)]
        force: bool,
    },
    /// Produce or serve a derived artifact
    Artifact {
        /// Repository in owner/name form
        repo: String,
        /// Artifact to produce, e.g. "insights", "wordcloud_title", "topics_body"
        #[arg(long)]
        kind: String,
        /// Bypass the cache and regenerate
        #[arg(long)]
        force: bool,
    },
    /// Show cache presence and freshness for a repository
    Status {
        /// Repository in owner/name form
        repo: String,
    },
    /// Drop every cached row and vector for a repository
    Clear {
        /// Repository in owner/name form
        repo: String,
    },
    /// Index the repository's issues for similarity search
    Index {
        /// Repository in owner/name form
        repo: String,
        /// Refetch issues before indexing
        #[arg(long)]
        force: bool,
    },
    /// Find issues similar to a free-text query
    Search {
        /// Repository in owner/name form
        repo: String,
        /// Free-text query
        query: String,
        /// Number of results to return
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Run a read-only SQL query against the repository's issues
    Query {
        /// Repository in owner/name form
        repo: String,
        /// SELECT statement over the "issues" table
        sql: String,
    },
    /// Show or edit the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Repo { repo, force } => {
            show_repository(&repo, force).await?;
        }
        Commands::Issues { repo, force } => {
            show_issues(&repo, force).await?;
        }
        Commands::Artifact { repo, kind, force } => {
            let kind: ArtifactKind = kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            show_artifact(&repo, kind, force).await?;
        }
        Commands::Status { repo } => {
            show_cache_status(&repo).await?;
        }
        Commands::Clear { repo } => {
            clear_repository(&repo).await?;
        }
        Commands::Index { repo, force } => {
            index_repository(&repo, force).await?;
        }
        Commands::Search { repo, query, top_k } => {
            search_issues(&repo, &query, top_k).await?;
        }
        Commands::Query { repo, sql } => {
            run_query(&repo, &sql).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                println!("Edit the configuration file directly, then rerun with --show.");
                show_config()?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["repolens", "repo", "rust-lang/rust"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Repo { .. });
        }
    }

    #[test]
    fn artifact_command_with_kind() {
        let cli = Cli::try_parse_from([
            "repolens",
            "artifact",
            "rust-lang/rust",
            "--kind",
            "wordcloud_title",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Artifact { repo, kind, force } = parsed.command {
                assert_eq!(repo, "rust-lang/rust");
                assert_eq!(kind, "wordcloud_title");
                assert!(!force);
            }
        }
    }

    #[test]
    fn artifact_command_requires_kind() {
        let cli = Cli::try_parse_from(["repolens", "artifact", "rust-lang/rust"]);
        assert!(cli.is_err());
    }

    #[test]
    fn search_command_with_top_k() {
        let cli = Cli::try_parse_from([
            "repolens",
            "search",
            "rust-lang/rust",
            "segfault in codegen",
            "--top-k",
            "5",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, top_k, .. } = parsed.command {
                assert_eq!(query, "segfault in codegen");
                assert_eq!(top_k, 5);
            }
        }
    }

    #[test]
    fn search_top_k_defaults_to_ten() {
        let cli = Cli::try_parse_from(["repolens", "search", "rust-lang/rust", "panic"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { top_k, .. } = parsed.command {
                assert_eq!(top_k, 10);
            }
        }
    }

    #[test]
    fn force_flag() {
        let cli = Cli::try_parse_from(["repolens", "issues", "rust-lang/rust", "--force"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Issues { force, .. } = parsed.command {
                assert!(force);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["repolens", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["repolens", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["repolens", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
