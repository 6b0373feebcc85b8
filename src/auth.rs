// src/auth.rs
//
// Login and control-page discovery. Login failures are fatal for the whole
// run; everything downstream assumes an authenticated session.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Settings;
use crate::core::html::{attr_ci, open_tags_ci};
use crate::error::{Error, Result};
use crate::session::{absolute_url, save_html, Session};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticate against the portal. Returns the post-login HTML on success.
pub fn login(session: &Session, settings: &Settings, user: &str, password: &str) -> Result<String> {
    if user.is_empty() || password.is_empty() {
        return Err(Error::Login(s!("user and password must be provided")));
    }

    info!("opening login page");
    session
        .get_text(&settings.login_url(), LOGIN_TIMEOUT)
        .map_err(|e| Error::Login(format!("network error during login: {e}")))?;

    session.set_org_cookie(settings);

    let mut data = BTreeMap::new();
    data.insert(s!("txtUsuario"), s!(user));
    data.insert(s!("pwdSenha"), s!(password));
    data.insert(s!("selOrgao"), settings.org.clone());
    data.insert(s!("hdnAcao"), s!("2"));
    data.insert(s!("Acessar"), s!("Acessar"));

    info!("sending login POST");
    let html = session
        .post_form(&settings.login_url(), &data, None, LOGIN_TIMEOUT)
        .map_err(|e| Error::Login(format!("network error during login: {e}")))?;

    save_html(settings, &settings.debug_dir().join("login.html"), &html);

    let ok = html.contains("Sair") || html.contains("Controle de Processos");
    if ok {
        if !session.has_cookie_containing(settings, "SIP") {
            warn!("login looks successful but no session cookie was stored");
        }
        info!("authenticated");
        return Ok(html);
    }

    let lowered = html.to_lowercase();
    if lowered.contains("usuário ou senha") || lowered.contains("inval") {
        return Err(Error::Login(s!("invalid credentials")));
    }
    if lowered.contains("bloqueado") || lowered.contains("bloqueio") {
        return Err(Error::Login(s!("account locked")));
    }
    Err(Error::Login(s!("login not confirmed - check credentials")))
}

/// Find the absolute URL of the process control page in the post-login HTML.
pub fn discover_control_url(settings: &Settings, html: &str) -> Option<String> {
    for (a, b) in open_tags_ci(html, "a") {
        if let Some(href) = attr_ci(&html[a..b], "href") {
            if href.contains("acao=procedimento_controlar") {
                return Some(absolute_url(settings, &href));
            }
        }
    }
    None
}

/// Open the process control page. Returns its HTML and the URL used.
pub fn open_control(session: &Session, settings: &Settings, post_login_html: &str) -> Result<(String, String)> {
    let url = discover_control_url(settings, post_login_html).unwrap_or_else(|| {
        format!("{}/sei/controlador.php?acao=procedimento_controlar", settings.base_url)
    });
    info!(url, "opening process control");
    let html = session
        .get_text(&url, LOGIN_TIMEOUT)
        .map_err(|e| Error::Process(format!("error opening process control: {e}")))?;
    save_html(settings, &settings.debug_dir().join("controle_pagina_1.html"), &html);
    Ok((html, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_url_is_discovered_from_links() {
        let settings = Settings {
            org: s!("28"),
            unit: s!("U"),
            base_url: s!("https://sei.example"),
            ..Default::default()
        };
        let html = r#"<a href="menu.php">menu</a>
                      <a href="controlador.php?acao=procedimento_controlar&infra_sistema=1">ok</a>"#;
        assert_eq!(
            discover_control_url(&settings, html).as_deref(),
            Some("https://sei.example/sei/controlador.php?acao=procedimento_controlar&infra_sistema=1")
        );
        assert!(discover_control_url(&settings, "<a href='x.php'>no</a>").is_none());
    }
}
