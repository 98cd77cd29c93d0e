//! First-run file generation.

use std::fs;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use tracing::info;

use crate::error::CoreResult;
use crate::layout::Layout;

const PASSWORD_PLACEHOLDER: &str = "CHANGE_ME_STRONG_PASSWORD";
const SECRET_PLACEHOLDER: &str = "CHANGE_ME_LONG_RANDOM_SECRET";

const ALERTS_TEMPLATE: &str = "\
# opsdeck alerting (local only, never committed)
#
# To enable:
# 1) configure at least one channel (WeCom / Telegram / Bark)
# 2) set ALERT_ENABLED to 1
#

ALERT_ENABLED=0
ALERT_INTERVAL_S=30
ALERT_REPEAT_MINUTES=30
ALERT_SEND_RECOVERY=1
# also alert on unfinished setup (DNS / pages / named tunnel init)
ALERT_INCLUDE_SETUP=0

# silence window, HH:MM, empty = never silenced; may cross midnight
ALERT_SILENCE_START=
ALERT_SILENCE_END=

# WeCom group robot webhook
# e.g. https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=xxxx
ALERT_WECOM_WEBHOOK=

# Telegram
ALERT_TG_BOT_TOKEN=
ALERT_TG_CHAT_ID=

# Bark URL prefix, e.g. https://api.day.app/<key>
ALERT_BARK_URL=
";

/// URL-safe random token from `n_bytes` of entropy (4/3 chars per byte).
pub fn random_token(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn is_blank(path: &std::path::Path) -> bool {
    match fs::read_to_string(path) {
        Ok(text) => text.trim().is_empty(),
        Err(_) => true,
    }
}

/// Generate the deployment env file when it is missing or blank.
///
/// Returns `Ok(true)` when a file was written. Existing content is never
/// regenerated.
pub fn ensure_home_env_file(layout: &Layout) -> CoreResult<bool> {
    if !is_blank(&layout.home_env) {
        return Ok(false);
    }

    let password = random_token(24);
    let secret = random_token(48);

    let content = match fs::read_to_string(&layout.home_env_example) {
        Ok(template) => template
            .replace(PASSWORD_PLACEHOLDER, &password)
            .replace(SECRET_PLACEHOLDER, &secret),
        Err(_) => format!(
            "# Auto-generated by opsdeck\n\
             POSTGRES_DB=naibao\n\
             POSTGRES_USER=naibao_user\n\
             POSTGRES_PASSWORD={password}\n\
             JWT_SECRET={secret}\n\
             ADMIN_USER_IDS=\n\
             NB_BACKEND_HOST_PORT=18080\n\
             NB_PUBLIC_DOMAIN=naibao.me\n\
             CORS_ALLOW_ORIGINS=https://naibao.me,https://www.naibao.me\n\
             NB_TUNNEL_MODE=named\n\
             NB_TUNNEL_NAME=naibao-api\n\
             NB_TUNNEL_HOSTNAME=api.naibao.me\n"
        ),
    };

    if let Some(parent) = layout.home_env.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&layout.home_env, content)?;
    info!(path = %layout.home_env.display(), "generated deployment env file");
    Ok(true)
}

/// Write the commented default alerts config when absent.
pub fn ensure_alerts_env_file(layout: &Layout) -> CoreResult<bool> {
    if layout.alerts_env.exists() {
        return Ok(false);
    }
    layout.ensure_runtime_dir()?;
    fs::write(&layout.alerts_env, ALERTS_TEMPLATE)?;
    info!(path = %layout.alerts_env.display(), "generated alerts env file");
    Ok(true)
}
