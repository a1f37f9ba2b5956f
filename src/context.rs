//! Deploy context, built once per invocation and passed to every operation

use crate::compiler::{Compiler, Solc};
use crate::config::{fast_confirm_env, Backend, Config, DEFAULT_GAS_LIMIT};
use crate::contract::{Bytes, HexFormat};
use crate::deployer::{AccountDeployer, Deployer, UtxoDeployer};
use crate::error::Result;
use crate::repository::ContractsRepository;
use crate::rpc::RpcClient;
use tracing::info;

pub struct DeployContext {
    pub env: String,
    pub repo: ContractsRepository,
    pub deployer: Box<dyn Deployer>,
    pub compiler: Box<dyn Compiler>,
    /// Byte format for resolved addresses, set by the active backend.
    pub format: HexFormat,
    /// Whether blocks may be forced after submission (local chains only).
    pub fast_confirm: bool,
    pub gas_limit: u64,
}

impl DeployContext {
    /// Assemble a context from explicit parts, with the default gas limit and
    /// the fast-confirm rule for `env`.
    pub fn new(
        env: &str,
        mut repo: ContractsRepository,
        deployer: Box<dyn Deployer>,
        compiler: Box<dyn Compiler>,
    ) -> Self {
        if repo.env().is_empty() {
            repo.set_env(env);
        }
        let format = deployer.hex_format();
        DeployContext {
            env: env.to_string(),
            repo,
            deployer,
            compiler,
            format,
            fast_confirm: fast_confirm_env(env),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }

    /// Open the ledger and connect the configured backend.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let backend = config.backend()?;
        let poll_interval = config.poll_interval()?;
        let repo = ContractsRepository::open(config.ledger_path())?;

        let deployer: Box<dyn Deployer> = match backend {
            Backend::Account { url, sender } => {
                info!("Using account-model backend at {}", url);
                let deployer = AccountDeployer::new(RpcClient::new(&url)?, poll_interval);
                match sender {
                    Some(sender) => Box::new(deployer.with_sender(sender)),
                    None => Box::new(deployer),
                }
            }
            Backend::Utxo { url, sender } => {
                info!("Using UTXO-model backend at {}", url);
                let deployer = UtxoDeployer::new(RpcClient::new(&url)?, poll_interval);
                match sender {
                    Some(sender) => Box::new(deployer.with_sender(sender)),
                    None => Box::new(deployer),
                }
            }
        };

        let compiler = Box::new(Solc {
            binary: config.solc.binary.clone(),
            optimize: config.solc.optimize,
            allow_paths: config.solc.allow_paths.clone(),
        });

        let mut ctx = DeployContext::new(&config.env, repo, deployer, compiler);
        ctx.fast_confirm = config.allows_fast_confirm();
        ctx.gas_limit = config.gas_limit;
        Ok(ctx)
    }

    /// Render an address in the active backend's format.
    pub fn format_address(&self, address: &Bytes) -> String {
        address.to_hex(self.format)
    }
}
