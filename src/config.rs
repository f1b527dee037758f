use dotenvy::dotenv;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub struct Config {
    pub rpc_provider: Arc<Provider<Http>>,
    pub wallet_private_key: String,
    pub database_url: String,
    pub chain_id: u64,
    pub network_mode: String,
    pub swap_router: Address,
    pub slippage_tolerance: Decimal,
    pub confirmation_timeout: Duration,
    pub confirmation_poll_interval: Duration,
}

impl Config {
    pub fn load() -> Self {
        dotenv().ok();

        let network_mode = env::var("NETWORK_MODE").unwrap_or_else(|_| "test".to_string());

        let rpc_url = match network_mode.as_str() {
            "test" => env::var("RPC_URL_TEST").expect("Missing RPC_URL_TEST"),
            "prod" => env::var("RPC_URL_PROD").expect("Missing RPC_URL_PROD"),
            _ => panic!("Invalid NETWORK_MODE value (must be 'test' or 'prod')"),
        };

        let wallet_private_key = match network_mode.as_str() {
            "test" => env::var("WALLET_PRIVATE_KEY_TEST").expect("Missing WALLET_PRIVATE_KEY_TEST"),
            "prod" => env::var("WALLET_PRIVATE_KEY_PROD").expect("Missing WALLET_PRIVATE_KEY_PROD"),
            _ => panic!("Invalid NETWORK_MODE"),
        };

        let database_url = env::var("DATABASE_URL").expect("Missing DATABASE_URL");

        let chain_id = env::var("CHAIN_ID")
            .expect("Missing CHAIN_ID")
            .parse::<u64>()
            .expect("CHAIN_ID must be a u64");

        let swap_router = Address::from_str(
            &env::var("SWAP_ROUTER_ADDRESS").expect("Missing SWAP_ROUTER_ADDRESS"),
        )
        .expect("SWAP_ROUTER_ADDRESS must be a valid address");

        // Planner/executor tunables, all optional with defaults
        let slippage_tolerance = env::var("SLIPPAGE_TOLERANCE")
            .ok()
            .map(|s| Decimal::from_str(&s).expect("SLIPPAGE_TOLERANCE must be a decimal fraction"))
            .unwrap_or_else(|| Decimal::new(5, 3)); // 0.5%

        let confirmation_timeout = Duration::from_secs(
            env::var("CONFIRMATION_TIMEOUT_SECS")
                .ok()
                .map(|s| s.parse::<u64>().expect("CONFIRMATION_TIMEOUT_SECS must be a u64"))
                .unwrap_or(60),
        );

        let confirmation_poll_interval = Duration::from_secs(
            env::var("CONFIRMATION_POLL_SECS")
                .ok()
                .map(|s| s.parse::<u64>().expect("CONFIRMATION_POLL_SECS must be a u64"))
                .unwrap_or(2),
        );

        let provider = Provider::<Http>::try_from(rpc_url).expect("Failed to create RPC provider");

        Config {
            rpc_provider: Arc::new(provider),
            wallet_private_key,
            database_url,
            chain_id,
            network_mode,
            swap_router,
            slippage_tolerance,
            confirmation_timeout,
            confirmation_poll_interval,
        }
    }
}
