use livy_http::{ClientFactory, Endpoint, EndpointRegistry};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("LIVY_URL")?;
    let auth = std::env::var("LIVY_AUTH").unwrap_or_else(|_| "None".to_owned());
    let username = std::env::var("LIVY_USERNAME").unwrap_or_default();
    let password = std::env::var("LIVY_PASSWORD").unwrap_or_default();

    let mut endpoints = EndpointRegistry::new();
    let endpoint = endpoints.add(Endpoint::parse(&url, &auth, username, password)?);
    println!("Added endpoint {url}");

    let factory = ClientFactory::from_env()?;
    let client = factory.client_for(endpoint);

    let created = client
        .post("/sessions", &[201], &json!({ "kind": "pyspark" }))
        .await?;
    let session: serde_json::Value = created.json()?;
    println!("created session {}", session["id"]);

    let listed = client.get("/sessions", &[200]).await?;
    println!("{}", listed.body);

    if let Some(id) = session["id"].as_u64() {
        client.delete(&format!("/sessions/{id}"), &[200, 404]).await?;
    }

    Ok(())
}
