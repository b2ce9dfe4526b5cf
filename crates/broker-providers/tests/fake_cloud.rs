use broker_providers::fakes::{ops, templates};
use broker_providers::{ArmDeployer, DatabaseAccountsClient, DeploymentRequest, FakeCloud, ProviderError};
use std::sync::Arc;
use std::time::Duration;

fn cosmos_request(account: &str) -> DeploymentRequest {
  DeploymentRequest::new("dep-cosmos", "rg", "westus", templates::COSMOSDB_SQL).with_parameter("accountName", account)
}

#[tokio::test]
async fn cosmos_account_lifecycle() {
  let cloud = FakeCloud::new();
  let outputs = cloud.deploy(&cosmos_request("acct")).await.unwrap();
  let key = outputs["primaryKey"].as_str().unwrap().to_string();
  assert!(outputs["fullyQualifiedDomainName"].as_str().unwrap().contains("acct"));

  cloud.create_database("acct", "db", &key).await.unwrap();
  assert!(cloud.create_database("acct", "db", &key).await.unwrap_err().is_conflict());
  assert!(matches!(cloud.create_database("acct", "db2", "bad").await, Err(ProviderError::Remote(_))));

  cloud.delete_account("rg", "acct").await.unwrap();
  assert!(!cloud.has_cosmos_database("acct", "db"));
  assert!(cloud.delete_account("rg", "acct").await.unwrap_err().is_not_found());
  assert_eq!(cloud.calls(ops::DELETE_ACCOUNT), 2);
}

#[tokio::test]
async fn deleting_deployment_keeps_resources() {
  let cloud = FakeCloud::new();
  cloud.deploy(&cosmos_request("acct")).await.unwrap();
  cloud.delete("dep-cosmos", "rg").await.unwrap();
  assert!(!cloud.has_deployment("rg", "dep-cosmos"));
  assert!(cloud.has_account("rg", "acct"));
  assert!(cloud.delete("dep-cosmos", "rg").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn mysql_database_requires_existing_server() {
  let cloud = FakeCloud::new();
  let req = DeploymentRequest::new("dep-db", "rg", "eastus", templates::MYSQL_DATABASE).with_parameter("serverName", "missing")
                                                                                        .with_parameter("databaseName", "db");
  assert!(cloud.deploy(&req).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn latency_can_be_abandoned_by_the_caller() {
  let cloud = Arc::new(FakeCloud::new().with_latency(Duration::from_secs(5)));
  let res = tokio::time::timeout(Duration::from_millis(20), cloud.deploy(&cosmos_request("slow"))).await;
  assert!(res.is_err());
  assert!(!cloud.has_account("rg", "slow"));
}
