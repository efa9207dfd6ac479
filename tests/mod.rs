mod token_codec;
mod web_routes;

// This file organizes the integration tests into a cohesive test suite.
// Each module tests a specific aspect of the application:
// - anthropic_mock: Event extraction against a mocked Messages API
// - confirmation_flow: Issuing and redeeming confirmation links
// - google_calendar_mock: Calendar and OAuth calls against a mocked Google API
// - token_codec: Signed token format, tampering and expiry
// - web_routes: The HTTP surface driven through the router
