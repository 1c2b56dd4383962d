use crate::{Result, TestInfraError};
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use tokio::net::TcpStream;
use typed_builder::TypedBuilder;

const MYSQL_PORT: u16 = 3306;

/// Settings of the disposable MySQL server.
///
/// The server defaults to a binary NO PAD collation, so URL comparisons
/// are exact, the same as in production. Binary logging is off so tests
/// may create triggers without extra privileges.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "burrow".to_string(), setter(into))]
    database: String,
    #[builder(default = "burrow".to_string(), setter(into))]
    username: String,
    #[builder(default = "burrow".to_string(), setter(into))]
    password: String,
    #[builder(default = "8.4".to_string(), setter(into))]
    tag: String,
    #[builder(default = Duration::from_secs(120))]
    startup_timeout: Duration,
}

pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MysqlConfig,
}

impl MySqlServer {
    /// Starts the container and waits until the final server accepts TCP
    /// connections. The init-time server listens on no port, so a
    /// successful connect means initialisation is over.
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", config.tag.as_str())
            .with_exposed_port(MYSQL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .with_cmd(vec![
                "--character-set-server=utf8mb4",
                "--collation-server=utf8mb4_0900_bin",
                "--skip-log-bin",
            ])
            .with_startup_timeout(config.startup_timeout)
            .start()
            .await?;

        let server = Self { container, config };
        server.wait_until_accepting().await?;
        Ok(server)
    }

    async fn wait_until_accepting(&self) -> Result<()> {
        let address = format!("{}:{}", self.host().await?, self.port().await?);
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;

        loop {
            match TcpStream::connect(&address).await {
                Ok(_) => return Ok(()),
                Err(err) if tokio::time::Instant::now() >= deadline => {
                    return Err(TestInfraError::Startup(format!(
                        "mysql at {address} never accepted connections: {err}"
                    )));
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
            }
        }
    }

    pub async fn host(&self) -> Result<String> {
        let host = self.container.get_host().await?.to_string();
        Ok(match host.as_str() {
            "localhost" => String::from("127.0.0.1"),
            _ => host,
        })
    }

    pub async fn port(&self) -> Result<u16> {
        Ok(self.container.get_host_port_ipv4(MYSQL_PORT).await?)
    }

    /// `mysql://` DSN of the test database.
    pub async fn database_url(&self) -> Result<String> {
        let host = self.host().await?;
        let port = self.port().await?;
        Ok(format!(
            "mysql://{}:{}@{}:{}/{}",
            self.config.username, self.config.password, host, port, self.config.database
        ))
    }
}
