use super::pages::ResultPage;
use super::AppState;
use crate::components::confirmation::RedeemError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    token: Option<String>,
}

/// Redeem a confirmation link and show the outcome
pub async fn confirm_handler(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return ResultPage::failure("Error", "No confirmation token provided.")
            .into_response_with(StatusCode::BAD_REQUEST);
    };

    match state.flow.redeem(&token).await {
        Ok(redeemed) => ResultPage::success(
            "Event Created!",
            format!("\"{}\" has been added to your calendar!", redeemed.payload.title),
        )
        .with_details(redeemed.payload.summary_lines())
        .with_calendar_link(redeemed.created.html_link)
        .into_response_with(StatusCode::OK),
        Err(e) => {
            let (heading, status) = match &e {
                RedeemError::Invalid(_) => ("Invalid or Expired", StatusCode::BAD_REQUEST),
                RedeemError::InvalidEvent(_) => ("Error", StatusCode::BAD_REQUEST),
                RedeemError::CreateFailed(_) => ("Error", StatusCode::BAD_GATEWAY),
                RedeemError::TimedOut => ("Try Again", StatusCode::GATEWAY_TIMEOUT),
            };
            ResultPage::failure(heading, e.user_message()).into_response_with(status)
        }
    }
}
