pub mod app_config;
pub mod erp;

pub use app_config::Config;
pub use erp::ErpDatasourceClient;
