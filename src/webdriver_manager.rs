use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::webdriver::BrowserType;

const READY_ATTEMPTS: u32 = 30;
const READY_INTERVAL: Duration = Duration::from_millis(100);
const STATUS_TIMEOUT: Duration = Duration::from_secs(1);

/// Locates or launches the geckodriver / chromedriver process a browser talks to
pub struct DriverManager {
    processes: Mutex<Vec<DriverProcess>>,
}

struct DriverProcess {
    browser_type: BrowserType,
    child: Child,
    url: String,
}

impl Default for DriverManager {
    fn default() -> Self {
        Self {
            processes: Mutex::new(Vec::new()),
        }
    }
}

impl DriverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL of a ready driver for `browser_type`, starting one if needed
    pub async fn ensure_driver(&self, browser_type: BrowserType) -> Result<String> {
        for url in self.managed_urls(browser_type) {
            if Self::is_ready(&url).await {
                debug!("Reusing managed {} at {}", browser_type.driver_name(), url);
                return Ok(url);
            }
        }

        let standard = format!("http://localhost:{}", browser_type.default_port());
        if Self::is_ready(&standard).await {
            debug!("Found running {} at {}", browser_type.driver_name(), standard);
            return Ok(standard);
        }

        info!(
            "No {} detected, starting one",
            browser_type.driver_name()
        );
        self.start_driver(browser_type).await
    }

    fn managed_urls(&self, browser_type: BrowserType) -> Vec<String> {
        match self.processes.lock() {
            Ok(processes) => processes
                .iter()
                .filter(|p| p.browser_type == browser_type)
                .map(|p| p.url.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn start_driver(&self, browser_type: BrowserType) -> Result<String> {
        let driver = browser_type.driver_name();
        let port = Self::find_free_port(browser_type)?;
        let port_arg = match browser_type {
            BrowserType::Firefox => vec!["--port".to_string(), port.to_string()],
            BrowserType::Chrome => vec![format!("--port={}", port)],
        };

        let mut cmd = Command::new(driver);
        cmd.args(&port_arg).stdout(Stdio::null()).stderr(Stdio::null());

        // Own process group so the browser children go down with the driver
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => anyhow::bail!(
                "{} not found in PATH. Install it (e.g. `brew install {}`) or start it manually on port {}",
                driver,
                driver,
                browser_type.default_port()
            ),
            Err(e) => return Err(e).context(format!("Failed to start {}", driver)),
        };

        let pid = child.id();
        let url = format!("http://localhost:{}", port);
        if let Ok(mut processes) = self.processes.lock() {
            processes.push(DriverProcess {
                browser_type,
                child,
                url: url.clone(),
            });
        }

        for _ in 0..READY_ATTEMPTS {
            if Self::is_ready(&url).await {
                info!("{} ready on port {}", driver, port);
                return Ok(url);
            }
            sleep(READY_INTERVAL).await;
        }

        self.stop_pid(pid);
        anyhow::bail!("{} did not become ready on port {}", driver, port)
    }

    /// Default driver port when free, otherwise one the OS hands out
    pub fn find_free_port(browser_type: BrowserType) -> Result<u16> {
        let preferred = browser_type.default_port();
        if !Self::is_port_in_use(preferred) {
            return Ok(preferred);
        }
        debug!("Port {} is taken, asking the OS for one", preferred);
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        Ok(listener.local_addr()?.port())
    }

    pub fn is_port_in_use(port: u16) -> bool {
        std::net::TcpListener::bind(("127.0.0.1", port)).is_err()
    }

    /// Whether the driver at `url` answers `/status` with `ready: true`
    pub async fn is_ready(url: &str) -> bool {
        let response = reqwest::Client::new()
            .get(format!("{}/status", url))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.pointer("/value/ready").and_then(|r| r.as_bool()))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Stop the managed driver for `browser_type`; the next `ensure_driver` starts a new one
    pub fn stop_driver(&self, browser_type: BrowserType) {
        let Ok(mut processes) = self.processes.lock() else {
            return;
        };
        processes.retain_mut(|p| {
            if p.browser_type == browser_type {
                Self::terminate(p);
                false
            } else {
                true
            }
        });
    }

    fn stop_pid(&self, pid: u32) {
        let Ok(mut processes) = self.processes.lock() else {
            return;
        };
        processes.retain_mut(|p| {
            if p.child.id() == pid {
                Self::terminate(p);
                false
            } else {
                true
            }
        });
    }

    fn terminate(process: &mut DriverProcess) {
        #[cfg(unix)]
        {
            let _ = Command::new("kill")
                .args(["-TERM", &format!("-{}", process.child.id())])
                .output();
        }
        if let Err(e) = process.child.kill() {
            debug!("Driver {} already gone: {}", process.child.id(), e);
        }
        let _ = process.child.wait();
    }

    /// Stop every driver this manager started
    pub fn stop_all(&self) {
        let Ok(mut processes) = self.processes.lock() else {
            warn!("Driver registry poisoned, skipping cleanup");
            return;
        };
        for process in processes.iter_mut() {
            debug!("Stopping driver at {}", process.url);
            Self::terminate(process);
        }
        processes.clear();
    }

    pub fn managed_count(&self) -> usize {
        self.processes.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Drop for DriverManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

lazy_static::lazy_static! {
    pub static ref GLOBAL_DRIVER_MANAGER: DriverManager = DriverManager::new();
}

#[cfg(test)]
#[path = "webdriver_manager_test.rs"]
mod webdriver_manager_test;
