//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, run, status,
//! cancel, stages, demo) e flags globais (--config, --verbose e ajustes do
//! motor).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::PipelineConfig;

/// Pipeline runner — motor de jobs em estágios com protocolo de polling.
#[derive(Debug, Parser)]
#[command(name = "pipeline-runner", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./pipeline.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Probabilidade de falha por estágio, sobrepõe o arquivo.
    #[arg(long, global = true)]
    pub failure_probability: Option<f64>,

    /// Duração base de cada estágio em milissegundos, sobrepõe o arquivo.
    #[arg(long, global = true)]
    pub base_duration_ms: Option<u64>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Aplica as flags da linha de comando sobre a configuração carregada.
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(p) = self.failure_probability {
            config.failure_probability = p;
        }
        if let Some(ms) = self.base_duration_ms {
            config.base_duration_ms = ms;
        }
        if let Command::Serve { bind: Some(addr) } = &self.command {
            config.bind_addr = addr.clone();
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe o servidor HTTP do pipeline.
    Serve {
        /// Endereço de escuta, ex.: 0.0.0.0:3000.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Inicia um pipeline no servidor e acompanha até o fim.
    Run {
        /// Tema livre do pipeline.
        theme: String,

        /// URL do servidor (padrão: server_url da configuração).
        #[arg(long)]
        server: Option<String>,
    },

    /// Mostra o status atual de um pipeline.
    Status {
        pipeline_id: String,

        #[arg(long)]
        server: Option<String>,
    },

    /// Cancela um pipeline em execução.
    Cancel {
        pipeline_id: String,

        #[arg(long)]
        server: Option<String>,
    },

    /// Lista os estágios do pipeline.
    Stages,

    /// Executa motor e poller no mesmo processo, sem HTTP.
    Demo {
        #[arg(default_value = "space opera")]
        theme: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["pipeline-runner", "run", "space opera"]);
        match cli.command {
            Command::Run { theme, server } => {
                assert_eq!(theme, "space opera");
                assert!(server.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "pipeline-runner",
            "--failure-probability",
            "0",
            "--base-duration-ms",
            "5",
            "--verbose",
            "demo",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.failure_probability, Some(0.0));
        assert_eq!(cli.base_duration_ms, Some(5));
        assert!(matches!(cli.command, Command::Demo { ref theme } if theme == "space opera"));
    }

    #[test]
    fn overrides_apply_to_config() {
        let cli = Cli::parse_from([
            "pipeline-runner",
            "serve",
            "--bind",
            "0.0.0.0:8080",
            "--failure-probability",
            "1",
        ]);
        let mut config = PipelineConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.failure_probability, 1.0);
        assert_eq!(config.base_duration_ms, 1500);
    }

    #[test]
    fn cli_parses_cancel_with_server() {
        let cli = Cli::parse_from([
            "pipeline-runner",
            "cancel",
            "abc",
            "--server",
            "http://localhost:9000",
        ]);
        match cli.command {
            Command::Cancel {
                pipeline_id,
                server,
            } => {
                assert_eq!(pipeline_id, "abc");
                assert_eq!(server.as_deref(), Some("http://localhost:9000"));
            }
            _ => panic!("expected Cancel command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
