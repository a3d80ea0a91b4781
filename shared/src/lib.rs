pub mod types;
pub mod error;
pub mod ddb;
pub mod users;
pub mod items;
pub mod claims;
pub mod notifications;
pub mod messages;
pub mod s3;

use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub dynamo_client: DynamoClient,
    pub s3_client: S3Client,
}

impl AppState {
    pub fn new(dynamo_client: DynamoClient, s3_client: S3Client) -> Arc<Self> {
        Arc::new(Self {
            dynamo_client,
            s3_client,
        })
    }
}
