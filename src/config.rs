//! Configuração do pipeline carregada a partir de `pipeline.toml`.
//!
//! A struct [`PipelineConfig`] contém todos os parâmetros ajustáveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `PIPELINE_BIND_ADDR` e `PIPELINE_SERVER_URL`
//! têm precedência sobre o arquivo.

use anyhow::{Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::registry::RetentionPolicy;
use crate::runner::StageTiming;

/// Nome do arquivo procurado no diretório atual quando nenhum caminho é dado.
pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

/// Configuração de nível superior carregada de `pipeline.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Duração base de cada estágio, em milissegundos.
    #[serde(default = "default_base_duration_ms")]
    pub base_duration_ms: u64,

    /// Variação máxima somada à duração base, em milissegundos.
    #[serde(default = "default_duration_variance_ms")]
    pub duration_variance_ms: u64,

    /// Probabilidade de um estágio falhar (0.0 a 1.0).
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,

    /// Intervalo entre consultas de status do cliente, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Endereço onde o servidor HTTP escuta.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// URL base usada pelo cliente para falar com o servidor.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Idade máxima, em segundos, de um job encerrado antes de ser descartado.
    /// Ausente significa retenção ilimitada.
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Frequência da varredura de retenção, em segundos.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Semente fixa para o gerador aleatório (execuções reproduzíveis).
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_base_duration_ms() -> u64 {
    1500
}

fn default_duration_variance_ms() -> u64 {
    1000
}

fn default_failure_probability() -> f64 {
    0.05
}

fn default_poll_interval_ms() -> u64 {
    1200
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_duration_ms: default_base_duration_ms(),
            duration_variance_ms: default_duration_variance_ms(),
            failure_probability: default_failure_probability(),
            poll_interval_ms: default_poll_interval_ms(),
            bind_addr: default_bind_addr(),
            server_url: default_server_url(),
            retention_secs: None,
            sweep_interval_secs: default_sweep_interval_secs(),
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Carrega a configuração de `path`, ou de `pipeline.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<PipelineConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo.
        if let Ok(addr) = std::env::var("PIPELINE_BIND_ADDR")
            && !addr.is_empty()
        {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("PIPELINE_SERVER_URL")
            && !url.is_empty()
        {
            config.server_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejeita combinações sem sentido antes que cheguem ao motor.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_probability) {
            bail!(
                "failure_probability must be between 0 and 1, got {}",
                self.failure_probability
            );
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn stage_timing(&self) -> StageTiming {
        StageTiming {
            base_duration: Duration::from_millis(self.base_duration_ms),
            duration_variance: Duration::from_millis(self.duration_variance_ms),
            failure_probability: self.failure_probability,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age: self.retention_secs.map(Duration::from_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
