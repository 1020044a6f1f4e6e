//! Chrome DevTools Protocol backend (chromiumoxide).
//!
//! One [`CdpBrowser`] owns the Chrome process and drives its CDP handler on a
//! spawned task. [`CdpPage`] is a cheap handle to the single tab and
//! implements every browser-facing trait the core needs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::correlator::SwipeCorrelator;
use crate::session::{AuthProvider, Credentials, SessionDriver};
use crate::swipe::{Geomatch, SwipeAction};
use crate::training::{ProfileSource, SwipeActuator};

#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub login_scripts_dir: Option<PathBuf>,
}

pub struct CdpBrowser {
    browser: Browser,
    page: CdpPage,
    handler: JoinHandle<()>,
}

impl CdpBrowser {
    pub async fn launch(options: &BrowserOptions) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder().viewport(None);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(dir) = &options.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;

        // Request events are delivered only while the handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "cdp handler error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;
        page.execute(network::EnableParams::default())
            .await
            .context("failed to enable network events")?;

        Ok(Self {
            browser,
            page: CdpPage {
                page,
                login_scripts_dir: options.login_scripts_dir.clone(),
            },
            handler,
        })
    }

    pub fn page(&self) -> CdpPage {
        self.page.clone()
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.browser.close().await.context("failed to close browser")?;
        self.handler.abort();
        Ok(())
    }
}

#[derive(Clone)]
pub struct CdpPage {
    page: Page,
    login_scripts_dir: Option<PathBuf>,
}

const PROBE_LOGGED_IN: &str = "window.location.pathname.startsWith('/app')";

const DUMP_LOCAL_STORAGE: &str = "Object.assign({}, window.localStorage)";

const OPEN_KEYVAL_DB: &str = r#"
const openKeyval = () => new Promise((resolve, reject) => {
    const req = indexedDB.open("keyval-store");
    req.onupgradeneeded = () => req.result.createObjectStore("keyval");
    req.onsuccess = () => resolve(req.result);
    req.onerror = () => reject(req.error);
});
const done = (req) => new Promise((resolve, reject) => {
    req.onsuccess = () => resolve(req.result);
    req.onerror = () => reject(req.error);
});
"#;

const SCRAPE_PROFILE: &str = r#"(() => {
    const card = document.querySelector('[data-keyboard-gamepad="true"][aria-hidden="false"]')
        || document.querySelector('.recsCardboard__cards');
    if (!card) return { name: null, imageUrls: [] };
    const nameEl = card.querySelector('[itemprop="name"]');
    const images = Array.from(card.querySelectorAll('[role="img"], .profileCard__slider__img'))
        .map(el => getComputedStyle(el).backgroundImage)
        .filter(bg => bg && bg.startsWith('url('));
    return {
        name: nameEl ? nameEl.textContent.trim() : null,
        imageUrls: [...new Set(images)],
    };
})()"#;

impl CdpPage {
    /// Feed this tab's outgoing requests into `correlator`.
    pub async fn subscribe(&self, correlator: &SwipeCorrelator) -> anyhow::Result<JoinHandle<()>> {
        correlator
            .attach(&self.page)
            .await
            .context("failed to subscribe to network requests")
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> anyhow::Result<T> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow!("invalid evaluate params: {e}"))?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.into_value()?)
    }

    async fn press(&self, key: &str, code: &str, key_code: i64, text: Option<&str>) -> anyhow::Result<()> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let mut builder = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key)
                .code(code)
                .windows_virtual_key_code(key_code);
            if let Some(text) = text {
                builder = builder.text(text);
            }
            let params = builder
                .build()
                .map_err(|e| anyhow!("invalid key event params: {e}"))?;
            self.page.execute(params).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionDriver for CdpPage {
    async fn open(&self, url: &str) -> anyhow::Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn reload(&self) -> anyhow::Result<()> {
        self.page.reload().await?;
        Ok(())
    }

    async fn is_logged_in(&self) -> anyhow::Result<bool> {
        self.eval(PROBE_LOGGED_IN).await
    }

    async fn set_local_storage(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let script = format!(
            "(() => {{ for (const [k, v] of Object.entries({})) window.localStorage.setItem(k, v); return true; }})()",
            serde_json::to_string(entries)?
        );
        self.eval::<bool>(&script).await?;
        Ok(())
    }

    async fn set_indexed_db(&self, entries: &BTreeMap<String, serde_json::Value>) -> anyhow::Result<()> {
        let script = format!(
            r#"(async () => {{
                {OPEN_KEYVAL_DB}
                const db = await openKeyval();
                const tx = db.transaction("keyval", "readwrite");
                const store = tx.objectStore("keyval");
                for (const [key, item] of Object.entries({entries})) store.put(item, key);
                await new Promise((resolve, reject) => {{
                    tx.oncomplete = resolve;
                    tx.onerror = () => reject(tx.error);
                }});
                db.close();
                return true;
            }})()"#,
            entries = serde_json::to_string(entries)?
        );
        self.eval::<bool>(&script).await?;
        Ok(())
    }

    async fn dump_local_storage(&self) -> anyhow::Result<BTreeMap<String, String>> {
        self.eval(DUMP_LOCAL_STORAGE).await
    }

    async fn dump_indexed_db(&self) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
        let script = format!(
            r#"(async () => {{
                {OPEN_KEYVAL_DB}
                const db = await openKeyval();
                const store = db.transaction("keyval", "readonly").objectStore("keyval");
                const keys = await done(store.getAllKeys());
                const items = await done(store.getAll());
                db.close();
                const out = {{}};
                keys.forEach((key, i) => {{ out[String(key)] = items[i]; }});
                return out;
            }})()"#
        );
        self.eval(&script).await
    }

    async fn login_using(&self, provider: AuthProvider, credentials: &Credentials) -> anyhow::Result<()> {
        let Some(dir) = &self.login_scripts_dir else {
            bail!("no login scripts directory configured for {provider} login");
        };
        let path = dir.join(format!("{provider}.js"));
        let body = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading login script {}", path.display()))?;

        debug!(script = %path.display(), "running login script");
        let script = format!(
            "(async () => {{ await (async (identifier, secret) => {{ {body} }})({}, {}); return true; }})()",
            serde_json::to_string(&credentials.identifier)?,
            serde_json::to_string(credentials.secret())?
        );
        self.eval::<bool>(&script).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileSource for CdpPage {
    async fn current_profile(&self) -> anyhow::Result<Option<Geomatch>> {
        let geomatch: Geomatch = self.eval(SCRAPE_PROFILE).await?;
        if geomatch.name.is_none() && geomatch.image_urls.is_empty() {
            return Ok(None);
        }
        Ok(Some(geomatch))
    }
}

#[async_trait]
impl SwipeActuator for CdpPage {
    async fn swipe(&self, action: SwipeAction) -> anyhow::Result<()> {
        let result = match action {
            SwipeAction::Like => self.press("ArrowRight", "ArrowRight", 39, None).await,
            SwipeAction::Dislike => self.press("ArrowLeft", "ArrowLeft", 37, None).await,
            SwipeAction::Superlike => self.press("Enter", "Enter", 13, Some("\r")).await,
        };
        if let Err(err) = &result {
            warn!(%action, error = %err, "key press failed");
        }
        result
    }
}
