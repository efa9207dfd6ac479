use snapcal::components::google_calendar::auth::{CALENDAR_SCOPES, GMAIL_SEND_SCOPE};
use snapcal::components::google_calendar::{GoogleAuth, GoogleCalendarClient};
use snapcal::error::{env_error, other_error, AppResult};
use std::env;
use url::Url;

const REDIRECT_URI: &str = "http://localhost:3333/callback";
const LISTEN_ADDR: &str = "127.0.0.1:3333";

#[tokio::main]
async fn main() -> miette::Result<()> {
    run().await?;
    Ok(())
}

async fn run() -> AppResult<()> {
    dotenvy::dotenv().ok();

    let client_id = env::var("GOOGLE_CLIENT_ID").map_err(|_| env_error("GOOGLE_CLIENT_ID"))?;
    let client_secret =
        env::var("GOOGLE_CLIENT_SECRET").map_err(|_| env_error("GOOGLE_CLIENT_SECRET"))?;
    let auth = GoogleAuth::new(&client_id, &client_secret);

    // Random state so a stray request cannot complete the flow
    let state = uuid::Uuid::new_v4().to_string();
    let scopes = [CALENDAR_SCOPES[0], CALENDAR_SCOPES[1], GMAIL_SEND_SCOPE];
    let auth_url = auth.authorization_url(REDIRECT_URI, &scopes, &state)?;

    println!("Opening browser for Google authorization...");
    println!("If it doesn't open automatically, visit:\n\n{}\n", auth_url);
    if let Err(e) = webbrowser::open(&auth_url) {
        println!("Could not open a browser: {}", e);
    }

    let server = tiny_http::Server::http(LISTEN_ADDR)
        .map_err(|e| other_error(&format!("Failed to start callback server: {}", e)))?;
    println!("Waiting for authorization callback on {}...", REDIRECT_URI);

    let code = loop {
        let request = server.recv()?;
        let url = Url::parse(&format!("http://localhost:3333{}", request.url()))
            .map_err(|e| other_error(&format!("Invalid callback URL: {}", e)))?;

        if url.path() != "/callback" {
            request.respond(tiny_http::Response::empty(tiny_http::StatusCode(404)))?;
            continue;
        }

        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        if let Some(error) = param("error") {
            request.respond(tiny_http::Response::from_string(format!(
                "Error: {}. Please try again.",
                error
            )))?;
            return Err(other_error(&format!("Authorization failed: {}", error)));
        }
        if param("state").as_deref() != Some(state.as_str()) {
            request.respond(
                tiny_http::Response::from_string("State mismatch")
                    .with_status_code(tiny_http::StatusCode(400)),
            )?;
            return Err(other_error("State mismatch in authorization callback"));
        }
        let Some(code) = param("code") else {
            request.respond(tiny_http::Response::empty(tiny_http::StatusCode(400)))?;
            return Err(other_error("No authorization code found in callback"));
        };

        request.respond(tiny_http::Response::from_string(
            "Authorization successful! You can close this window and go back to the terminal.",
        ))?;
        break code;
    };

    let tokens = auth.exchange_code(&code, REDIRECT_URI).await?;
    let refresh_token = tokens
        .refresh_token
        .as_deref()
        .ok_or_else(|| other_error("Google did not return a refresh token"))?;

    println!("\nSuccess! Add this to your .env:\n");
    println!("GOOGLE_REFRESH_TOKEN={}\n", refresh_token);

    let calendars = GoogleCalendarClient::new()
        .list_calendars(&tokens.access_token)
        .await?;
    println!("Your writable calendars:");
    for (index, calendar) in calendars.iter().enumerate() {
        let primary = if calendar.primary { " (Primary)" } else { "" };
        println!("{}. {}{}", index + 1, calendar.name, primary);
        println!("   ID: {}", calendar.id);
    }

    Ok(())
}
