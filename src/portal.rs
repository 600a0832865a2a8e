//! The bank portal boundary.
//!
//! The extraction driver only ever needs two things from the portal: select
//! an account in the archive, and run one month search that ends in a
//! download, an explicit "nothing here", or a timeout. [`StatementPortal`]
//! captures exactly that, so the driver can be exercised against a fake
//! portal in tests.
//!
//! [`DnbPortal`] is the real implementation. It drives a local
//! Chrome/Chromium through DNB's login and document archive over the
//! DevTools protocol and routes the browser's downloads into the working
//! directory. The archive's select controls are hidden behind a JS widget,
//! so option changes go through injected script rather than element clicks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Element, Page};
use dialoguer::{Input, Password};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::config::BrowserSettings;
use crate::months::MonthOffset;

const DNB_URL: &str = "https://www.dnb.no";

/// Document type value for account statements in the archive's type select.
const STATEMENT_DOCUMENT_TYPE: &str = "kontoutskrift";

const CONSENT_CLOSE: &str = "#consent-x";
const LOGIN_UID: &str = "#loginForm input[name='uid']";
const LOGIN_SUBMIT: &str = "#loginFormSubmit, #loginForm input[name='Login']";
const LOGIN_MECHANISMS: &str = "#r_state-2";
const LOGIN_PIN_MECHANISM: &str = "#r_state-2 > div:first-child";
const LOGIN_PIN: &str = "#phoneCode";
const LOGIN_OTP: &str = "#otpCode";
const LOGIN_CONFIRM: &str = "#r_state-2 form button";
const LANDING_MARKER: &str = "#gllwg04e";
const MENU_TOGGLE: &str = "#menuLoggedIn li:first-child > a";
const ARCHIVE_LINK: &str = "#gllwg07s";
const DOCUMENT_TYPE_BUTTON: &str = "#documentType-button";
const ACCOUNT_SELECT: &str = "#accountNumber";
const SEARCH_INTERVAL_SELECT: &str = "#searchIntervalIndex";
const SEARCH_SUBMIT: &str = "#archiveSearchSubmit";
const ATTACHMENT_LINK: &str = "table a[href='ajax/attachment/0/kontoutskrift']";
const NO_DOCUMENTS_VIEW: &str = "#userInformationView";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Terminal state of one month search.
///
/// These are values, not errors: a timeout is an expected state of the UI
/// and the driver branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The attachment link was present and clicked; the browser writes the
    /// file in the background. Completion is only observable on disk.
    DownloadStarted,
    /// The portal explicitly reported no statement for this month.
    Unavailable,
    /// The result surface never appeared within the bounded wait.
    TimedOut,
}

/// What the extraction driver needs from the bank's document archive.
#[async_trait]
pub trait StatementPortal: Send {
    /// Point the archive's search at one account (11-digit form).
    async fn select_account(&mut self, account_digits: &str) -> Result<()>;

    /// Search one month offset and drive it to a [`SearchOutcome`].
    async fn search_month(&mut self, offset: MonthOffset) -> Result<SearchOutcome>;
}

/// Chromium-driven session against DNB's web bank.
pub struct DnbPortal {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    login_timeout: Duration,
    search_timeout: Duration,
    // Held so the browser profile outlives the session.
    _profile_dir: tempfile::TempDir,
}

impl DnbPortal {
    /// Launch the browser with downloads routed into `download_dir`.
    pub async fn launch(settings: &BrowserSettings, download_dir: &Path) -> Result<Self> {
        let chrome_path = match &settings.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome()
                .context("Chrome/Chromium not found; set browser.chrome_path in the config")?,
        };

        let profile_dir =
            tempfile::tempdir().context("Failed to create browser profile directory")?;

        let mut config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(None)
            .user_data_dir(profile_dir.path())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !settings.headless {
            config = config.with_head();
        }
        let config = config
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser.new_page("about:blank").await?;

        std::fs::create_dir_all(download_dir).with_context(|| {
            format!("Failed to create download directory: {}", download_dir.display())
        })?;
        let download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.display().to_string())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build download params: {e}"))?;
        page.execute(download_params).await?;

        Ok(Self {
            browser,
            page,
            handler_task,
            login_timeout: settings.login_timeout,
            search_timeout: settings.search_timeout,
            _profile_dir: profile_dir,
        })
    }

    /// Log in with the national id plus a PIN + one-time password combo.
    ///
    /// The id is taken from config when present, otherwise prompted; PIN and
    /// OTP are always prompted since they change per login.
    pub async fn login(&mut self, ssn: Option<SecretString>) -> Result<()> {
        info!("logging in");

        self.page.goto(DNB_URL).await?;

        // A consent modal sometimes blocks the page; closing is best-effort.
        if let Ok(close) = self.page.find_element(CONSENT_CLOSE).await {
            close.click().await.ok();
        }

        let ssn = match ssn {
            Some(ssn) => ssn,
            None => SecretString::from(
                Input::<String>::new()
                    .with_prompt("National id number for DNB")
                    .interact_text()
                    .context("Failed to read national id number")?,
            ),
        };

        let uid = wait_for_element(&self.page, LOGIN_UID, self.login_timeout)
            .await
            .context("Login form did not appear")?;
        uid.click().await?;
        uid.type_str(ssn.expose_secret()).await?;
        self.page.find_element(LOGIN_SUBMIT).await?.click().await?;

        // Second stage: pick the PIN + OTP mechanism over BankID.
        wait_for_element(&self.page, LOGIN_MECHANISMS, self.login_timeout)
            .await
            .context("Login mechanism chooser did not appear")?;
        self.page
            .find_element(LOGIN_PIN_MECHANISM)
            .await?
            .click()
            .await?;

        let pin = Password::new()
            .with_prompt("PIN")
            .interact()
            .context("Failed to read PIN")?;
        let otp = Input::<String>::new()
            .with_prompt("One-time password")
            .interact_text()
            .context("Failed to read one-time password")?;

        let pin_field = wait_for_element(&self.page, LOGIN_PIN, self.login_timeout)
            .await
            .context("PIN field did not appear")?;
        pin_field.click().await?;
        pin_field.type_str(&pin).await?;
        let otp_field = self.page.find_element(LOGIN_OTP).await?;
        otp_field.click().await?;
        otp_field.type_str(&otp).await?;
        self.page.find_element(LOGIN_CONFIRM).await?.click().await?;

        wait_for_element(&self.page, LANDING_MARKER, self.login_timeout)
            .await
            .context("Login did not complete")?;

        Ok(())
    }

    /// Navigate from the landing page into the document archive and select
    /// the account-statement document type.
    pub async fn open_archive(&mut self) -> Result<()> {
        info!("opening document archive");

        let menu = wait_for_element(&self.page, MENU_TOGGLE, self.login_timeout)
            .await
            .context("Logged-in menu did not appear")?;
        menu.click().await?;
        self.page.find_element(ARCHIVE_LINK).await?.click().await?;

        wait_for_element(&self.page, DOCUMENT_TYPE_BUTTON, self.login_timeout)
            .await
            .context("Archive controls did not appear")?;
        let selected = self
            .choose_option("documentType", STATEMENT_DOCUMENT_TYPE)
            .await?;
        anyhow::ensure!(selected, "Document type select missing from archive page");

        Ok(())
    }

    /// Shut the browser down and reap its event handler.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.ok();
        self.handler_task.abort();
        Ok(())
    }

    /// Set a hidden select's value through injected script and fire its
    /// change event, the way the archive's own widget would. Returns whether
    /// the select existed.
    async fn choose_option(&self, element_id: &str, value: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ \
               const el = document.getElementById('{element_id}'); \
               if (!el) return false; \
               el.style.display = 'block'; \
               el.value = '{value}'; \
               el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
               return true; \
             }})()"
        );
        let found: bool = self.page.evaluate(script).await?.into_value()?;
        Ok(found)
    }
}

#[async_trait]
impl StatementPortal for DnbPortal {
    async fn select_account(&mut self, account_digits: &str) -> Result<()> {
        wait_for_element(&self.page, DOCUMENT_TYPE_BUTTON, self.login_timeout)
            .await
            .context("Archive controls did not appear")?;
        wait_for_element(&self.page, ACCOUNT_SELECT, self.login_timeout)
            .await
            .context("Account select did not appear")?;

        let selected = self.choose_option("accountNumber", account_digits).await?;
        anyhow::ensure!(selected, "Account select missing from archive page");
        Ok(())
    }

    async fn search_month(&mut self, offset: MonthOffset) -> Result<SearchOutcome> {
        if wait_for_element(&self.page, SEARCH_INTERVAL_SELECT, self.search_timeout)
            .await
            .is_none()
        {
            return Ok(SearchOutcome::TimedOut);
        }
        if !self
            .choose_option("searchIntervalIndex", &offset.to_string())
            .await?
        {
            // The select vanished between the wait and the write; same as a
            // timeout, the next pass retries.
            return Ok(SearchOutcome::TimedOut);
        }

        let Some(submit) = wait_for_element(&self.page, SEARCH_SUBMIT, self.search_timeout).await
        else {
            return Ok(SearchOutcome::TimedOut);
        };
        submit.click().await?;

        match wait_for_result_surface(&self.page, self.search_timeout).await {
            Some(ResultSurface::Attachment(link)) => {
                link.click().await?;
                Ok(SearchOutcome::DownloadStarted)
            }
            Some(ResultSurface::NoDocuments) => Ok(SearchOutcome::Unavailable),
            None => Ok(SearchOutcome::TimedOut),
        }
    }
}

enum ResultSurface {
    Attachment(Element),
    NoDocuments,
}

/// Bounded wait for a selector to match. Expiry is a value, not an error.
async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> Option<Element> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Some(element);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait for a search to resolve: either the attachment link or the
/// no-documents view, whichever the portal renders first.
async fn wait_for_result_surface(page: &Page, timeout: Duration) -> Option<ResultSurface> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(link) = page.find_element(ATTACHMENT_LINK).await {
            return Some(ResultSurface::Attachment(link));
        }
        if page.find_element(NO_DOCUMENTS_VIEW).await.is_ok() {
            return Some(ResultSurface::NoDocuments);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Probe the usual executable names for a local Chrome/Chromium.
fn find_chrome() -> Option<PathBuf> {
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }
    None
}
