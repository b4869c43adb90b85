//! Scripted stand-in for the browser, recording every call the driver makes.

#![allow(dead_code)]

use async_trait::async_trait;
use claim_uploader::uploader::{BrowserLauncher, BrowserSession, DriverSettings, Locator};
use claim_uploader::UploadError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const APP_URL: &str = "https://portal.test/claims";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Launch,
    Navigate(String),
    Click(String),
    ArmChooser,
    AwaitChooser,
    SetFiles(Vec<PathBuf>),
    Wait(Duration),
    Close,
}

/// How the fake portal behaves.
#[derive(Debug, Clone)]
pub struct Script {
    /// Number of matches per locator (by its display form).
    pub controls: HashMap<String, usize>,
    /// Lookups that come back empty before a control shows up.
    pub appears_after: HashMap<String, usize>,
    pub chooser_opens: bool,
    pub launch_error: Option<UploadError>,
    /// How long the browser takes to start.
    pub launch_delay: Option<Duration>,
    pub navigation_error: Option<UploadError>,
    /// Clicking this control kills the browser.
    pub crash_on_click: Option<String>,
    pub close_error: Option<UploadError>,
    /// Make `wait` actually sleep.
    pub real_wait: bool,
}

impl Default for Script {
    fn default() -> Self {
        let mut controls = HashMap::new();
        controls.insert(upload_claims(), 1);
        controls.insert(browse(), 1);
        controls.insert(submit(), 1);

        Self {
            controls,
            appears_after: HashMap::new(),
            chooser_opens: true,
            launch_error: None,
            launch_delay: None,
            navigation_error: None,
            crash_on_click: None,
            close_error: None,
            real_wait: false,
        }
    }
}

impl Script {
    pub fn without(mut self, locator: String) -> Self {
        self.controls.remove(&locator);
        self
    }

    pub fn with_count(mut self, locator: String, count: usize) -> Self {
        self.controls.insert(locator, count);
        self
    }
}

pub fn upload_claims() -> String {
    Locator::button("Upload claims").to_string()
}

pub fn browse() -> String {
    Locator::label("Browse").to_string()
}

pub fn submit() -> String {
    Locator::button("Submit").to_string()
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

pub struct FakeLauncher {
    script: Script,
    log: CallLog,
}

impl FakeLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: CallLog::default(),
        }
    }

    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self) -> Result<FakeSession, UploadError> {
        self.log.push(Call::Launch);
        if let Some(delay) = self.script.launch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = &self.script.launch_error {
            return Err(e.clone());
        }
        Ok(FakeSession {
            script: self.script.clone(),
            log: self.log.clone(),
            lookups: HashMap::new(),
            armed: false,
            chooser_fired: false,
            crashed: false,
        })
    }
}

pub struct FakeSession {
    script: Script,
    log: CallLog,
    lookups: HashMap<String, usize>,
    armed: bool,
    chooser_fired: bool,
    crashed: bool,
}

impl FakeSession {
    fn check_alive(&self) -> Result<(), UploadError> {
        if self.crashed {
            return Err(UploadError::SessionCrashed {
                reason: "browser process exited".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Element = String;
    type ChooserWatch = ();
    type FileChooser = ();

    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), UploadError> {
        self.check_alive()?;
        self.log.push(Call::Navigate(url.to_string()));
        match &self.script.navigation_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn find(&mut self, locator: &Locator) -> Result<Vec<String>, UploadError> {
        self.check_alive()?;
        let key = locator.to_string();

        let seen = self.lookups.entry(key.clone()).or_insert(0);
        *seen += 1;
        if let Some(&hidden_for) = self.script.appears_after.get(&key) {
            if *seen <= hidden_for {
                return Ok(Vec::new());
            }
        }

        let count = self.script.controls.get(&key).copied().unwrap_or(0);
        Ok(vec![key; count])
    }

    async fn click(&mut self, element: &String) -> Result<(), UploadError> {
        self.check_alive()?;
        self.log.push(Call::Click(element.clone()));

        if self.script.crash_on_click.as_deref() == Some(element.as_str()) {
            self.crashed = true;
            return Err(UploadError::SessionCrashed {
                reason: "browser process exited".to_string(),
            });
        }

        if *element == browse() && self.armed && self.script.chooser_opens {
            self.chooser_fired = true;
        }
        Ok(())
    }

    async fn arm_file_chooser(&mut self) -> Result<(), UploadError> {
        self.check_alive()?;
        self.log.push(Call::ArmChooser);
        self.armed = true;
        Ok(())
    }

    async fn await_file_chooser(
        &mut self,
        _watch: (),
        timeout: Duration,
    ) -> Result<(), UploadError> {
        self.check_alive()?;
        self.log.push(Call::AwaitChooser);
        if self.chooser_fired {
            Ok(())
        } else {
            Err(UploadError::FileChooserTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn set_files(&mut self, _chooser: (), files: &[PathBuf]) -> Result<(), UploadError> {
        self.check_alive()?;
        self.log.push(Call::SetFiles(files.to_vec()));
        Ok(())
    }

    async fn wait(&mut self, duration: Duration) {
        self.log.push(Call::Wait(duration));
        if self.script.real_wait {
            tokio::time::sleep(duration).await;
        }
    }

    async fn close(&mut self) -> Result<(), UploadError> {
        self.log.push(Call::Close);
        match &self.script.close_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

pub fn test_settings() -> DriverSettings {
    DriverSettings {
        app_url: APP_URL.to_string(),
        navigation_timeout: Duration::from_secs(1),
        control_timeout: Duration::from_millis(50),
        file_chooser_timeout: Duration::from_millis(100),
        quiescence_wait: Duration::from_millis(5000),
        poll_interval: Duration::from_millis(5),
    }
}
