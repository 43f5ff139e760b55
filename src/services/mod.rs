pub mod authorizer;
pub mod converter;
pub mod mailer;
pub mod pipeline;
pub mod workspace;
