use super::run_telegram_request;
use crate::guard::SessionError;
use grammers_client::{Client, SignInError};
use std::io::Write;

fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().collect();
    if digits.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = digits[digits.len() - 2..].iter().collect();
    format!("{}***{}", digits[0], tail)
}

/// Maps a failed login-code request to transport or authentication trouble.
fn classify_login_error(message: &str) -> SessionError {
    let s = message.to_lowercase();
    if s.contains("dropped") || s.contains("cancelled") || s.contains("timeout") || s.contains("io error") {
        SessionError::Transport(format!("Connection interrupted while requesting login code: {message}"))
    } else if s.contains("flood") {
        SessionError::AuthenticationFailed(format!(
            "Too many login attempts, wait before trying again: {message}"
        ))
    } else if s.contains("phone_number_invalid") || s.contains("invalid") {
        SessionError::AuthenticationFailed(format!("Invalid phone number: {message}"))
    } else {
        SessionError::AuthenticationFailed(format!("Failed to request login code: {message}"))
    }
}

async fn prompt_line(prompt: String) -> Result<String, SessionError> {
    tokio::task::spawn_blocking(move || {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok::<_, std::io::Error>(line.trim().to_string())
    })
    .await
    .map_err(|e| SessionError::AuthenticationFailed(format!("prompt aborted: {e}")))?
    .map_err(|e| SessionError::AuthenticationFailed(format!("failed to read input: {e}")))
}

async fn prompt_password(prompt: String) -> Result<String, SessionError> {
    tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
        .await
        .map_err(|e| SessionError::AuthenticationFailed(format!("prompt aborted: {e}")))?
        .map_err(|e| SessionError::AuthenticationFailed(format!("failed to read password: {e}")))
}

/// Phone-code sign-in on the terminal, with the 2FA password step when the
/// account has one.
pub(crate) async fn interactive_login(
    client: &Client,
    phone: &str,
    api_hash: &str,
) -> Result<(), SessionError> {
    log::info!("interactive_login: requesting login code for {}", mask_phone(phone));

    let token = run_telegram_request("interactive_login.request_login_code", || async {
        client.request_login_code(phone, api_hash).await
    })
    .await
    .map_err(|e| {
        log::error!("interactive_login: request_login_code failed: {}", e);
        classify_login_error(&e.to_string())
    })?;

    let code = prompt_line("Enter the login code Telegram sent you: ".to_string()).await?;
    if code.is_empty() {
        return Err(SessionError::AuthenticationFailed("Empty login code".to_string()));
    }

    match client.sign_in(&token, &code).await {
        Ok(user) => {
            log::info!("interactive_login: sign_in OK user_id={}", user.raw.id());
            Ok(())
        }
        Err(SignInError::PasswordRequired(password_token)) => {
            log::info!("interactive_login: account has 2FA enabled");
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt_password(format!("2FA password (hint: {hint}): ")).await?;

            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| SessionError::AuthenticationFailed(format!("2FA failed: {e}")))?;
            log::info!("interactive_login: check_password OK");
            Ok(())
        }
        Err(SignInError::InvalidCode) => Err(SessionError::AuthenticationFailed(
            "Invalid login code".to_string(),
        )),
        Err(SignInError::SignUpRequired { .. }) => Err(SessionError::AuthenticationFailed(
            "This number is not registered with Telegram".to_string(),
        )),
        Err(e) => Err(SessionError::AuthenticationFailed(format!("Sign-in failed: {e}"))),
    }
}
