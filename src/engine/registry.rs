// src/engine/registry.rs

//! Registry sessions.
//!
//! A [`RegistrySet`] logs in to each configured registry in order. If any
//! login fails, every registry already logged in is logged out again (in
//! login order) before the original error is returned, so a partial failure
//! never leaves a session behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::model::{EcrRegistry, GcrRegistry, Registry, ServerRegistry};
use crate::engine::cleanup::Cleanup;
use crate::environment::Environment;
use crate::errors::{IjError, Result};
use crate::exec::ProcessRunner;
use crate::exec::command::{login_args, logout_args};

const DEFAULT_GCR_HOST: &str = "gcr.io";
const DEFAULT_ECR_REGION: &str = "us-east-1";

/// Resolved login material for one registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Server address, without contacting anything.
    pub fn server(&self, env: &Environment) -> Result<String> {
        match self {
            Registry::Server(r) => env.expand_string(&r.server),
            Registry::Gcr(r) => Ok(match env.expand_option(r.hostname.as_deref())? {
                Some(host) if !host.is_empty() => host,
                _ => DEFAULT_GCR_HOST.to_string(),
            }),
            Registry::Ecr(r) => Ok(format!(
                "{}.dkr.ecr.{}.amazonaws.com",
                env.expand_string(&r.account_id)?,
                ecr_region(r, env)?
            )),
        }
    }

    pub async fn credentials(
        &self,
        env: &Environment,
        runner: &dyn ProcessRunner,
        cancel: &CancellationToken,
        project_dir: &Path,
    ) -> Result<Credentials> {
        let server = self.server(env)?;
        match self {
            Registry::Server(r) => server_credentials(r, server, env, project_dir),
            Registry::Gcr(r) => gcr_credentials(r, server, env, project_dir),
            Registry::Ecr(r) => ecr_credentials(r, server, env, runner, cancel).await,
        }
    }
}

fn read_secret(project_dir: &Path, file: &str) -> Result<String> {
    let path = project_dir.join(file);
    let contents =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(contents.trim_end().to_string())
}

fn server_credentials(
    r: &ServerRegistry,
    server: String,
    env: &Environment,
    project_dir: &Path,
) -> Result<Credentials> {
    let password = match (&r.password, &r.password_file) {
        (Some(p), _) => env.expand_string(p)?,
        (None, Some(file)) => read_secret(project_dir, &env.expand_string(file)?)?,
        (None, None) => {
            return Err(IjError::Execution(format!(
                "registry '{server}' has neither password nor password_file"
            )));
        }
    };
    Ok(Credentials {
        server,
        username: env.expand_string(&r.username)?,
        password,
    })
}

fn gcr_credentials(
    r: &GcrRegistry,
    server: String,
    env: &Environment,
    project_dir: &Path,
) -> Result<Credentials> {
    let password = match (&r.key, &r.key_file) {
        (Some(key), _) => env.expand_string(key)?,
        (None, Some(file)) => read_secret(project_dir, &env.expand_string(file)?)?,
        (None, None) => {
            return Err(IjError::Execution(format!(
                "gcr registry '{server}' has neither key nor key_file"
            )));
        }
    };
    Ok(Credentials {
        server,
        username: "_json_key".to_string(),
        password,
    })
}

fn ecr_region(r: &EcrRegistry, env: &Environment) -> Result<String> {
    Ok(match env.expand_option(r.region.as_deref())? {
        Some(region) if !region.is_empty() => region,
        _ => env
            .get("AWS_REGION")
            .unwrap_or(DEFAULT_ECR_REGION)
            .to_string(),
    })
}

async fn ecr_credentials(
    r: &EcrRegistry,
    server: String,
    env: &Environment,
    runner: &dyn ProcessRunner,
    cancel: &CancellationToken,
) -> Result<Credentials> {
    let mut args = Vec::new();
    if let (Some(id), Some(secret)) = (&r.access_key_id, &r.secret_access_key) {
        args.push("env".to_string());
        args.push(format!("AWS_ACCESS_KEY_ID={}", env.expand_string(id)?));
        args.push(format!("AWS_SECRET_ACCESS_KEY={}", env.expand_string(secret)?));
    }
    args.extend(
        ["aws", "ecr", "get-login-password", "--region"]
            .into_iter()
            .map(str::to_string),
    );
    args.push(ecr_region(r, env)?);

    let (stdout, _) = runner.run_for_output(cancel, args, None).await?;
    Ok(Credentials {
        server,
        username: "AWS".to_string(),
        password: stdout.trim().to_string(),
    })
}

/// The registries of one run, plus the servers currently logged in.
#[derive(Debug)]
pub struct RegistrySet {
    registries: Vec<Registry>,
    environment: Environment,
    runner: Arc<dyn ProcessRunner>,
    project_dir: PathBuf,
    logged_in: Mutex<Vec<String>>,
}

impl RegistrySet {
    pub fn new(
        registries: Vec<Registry>,
        environment: Environment,
        runner: Arc<dyn ProcessRunner>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registries,
            environment,
            runner,
            project_dir: project_dir.into(),
            logged_in: Mutex::new(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// Servers currently logged in, in login order.
    pub fn logged_in(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Log in to every registry sequentially.
    ///
    /// On failure, logs out of the registries already logged in and returns
    /// the original error. On success, registers [`RegistrySet::logout`]
    /// with `cleanup` when one is given.
    pub async fn login(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        cleanup: Option<&Cleanup>,
    ) -> Result<()> {
        for registry in self.registries.iter() {
            if let Err(e) = self.login_one(registry, cancel).await {
                warn!(error = %e, "registry login failed; rolling back earlier logins");
                self.logout().await;
                return Err(e);
            }
        }

        if let Some(cleanup) = cleanup {
            let set = Arc::clone(self);
            cleanup.register("registry logout", move || async move {
                set.logout().await;
                Ok(())
            });
        }
        Ok(())
    }

    async fn login_one(&self, registry: &Registry, cancel: &CancellationToken) -> Result<()> {
        let creds = registry
            .credentials(&self.environment, self.runner.as_ref(), cancel, &self.project_dir)
            .await?;
        self.runner
            .run_for_output(
                cancel,
                login_args(&creds.server, &creds.username),
                Some(creds.password.clone()),
            )
            .await
            .map_err(|e| IjError::Execution(format!("logging in to '{}': {e}", creds.server)))?;

        info!(server = %creds.server, "logged in to registry");
        self.lock().push(creds.server);
        Ok(())
    }

    /// Log out of every server logged in by this set, in login order.
    /// Failures are logged and do not stop the remaining logouts.
    pub async fn logout(&self) {
        let servers = std::mem::take(&mut *self.lock());
        let cancel = CancellationToken::new();
        for server in servers {
            self.logout_server(&cancel, &server).await;
        }
    }

    /// Log out of every configured registry, whether or not this set logged
    /// in to it.
    pub async fn logout_all(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        for registry in self.registries.iter() {
            let server = registry.server(&self.environment)?;
            self.logout_server(&cancel, &server).await;
        }
        self.lock().clear();
        Ok(())
    }

    async fn logout_server(&self, cancel: &CancellationToken, server: &str) {
        match self
            .runner
            .run_for_output(cancel, logout_args(server), None)
            .await
        {
            Ok(_) => info!(server = %server, "logged out of registry"),
            Err(e) => warn!(server = %server, error = %e, "registry logout failed"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.logged_in.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
