use qdrant_client::{
	Payload,
	qdrant::{Condition, Filter, SetPayloadPointsBuilder},
};
use serde_json::{Map, Value};

use crate::Result;

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
}
impl QdrantStore {
	pub fn new(cfg: &beacon_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone() })
	}

	pub fn match_filter(conditions: &[(String, String)]) -> Filter {
		Filter::must(
			conditions
				.iter()
				.map(|(field, value)| Condition::matches(field.as_str(), value.clone())),
		)
	}

	/// Merges `patch` into the payload of every point selected by `filter`. Keys not present in
	/// the patch are left untouched. With `key`, the patch is merged into that nested object.
	pub async fn set_payload(
		&self,
		filter: Filter,
		patch: Map<String, Value>,
		key: Option<&str>,
	) -> Result<()> {
		let payload = Payload::from(patch);
		let mut request = SetPayloadPointsBuilder::new(self.collection.clone(), payload)
			.points_selector(filter)
			.wait(true);

		if let Some(key) = key {
			request = request.key(key);
		}

		self.client.set_payload(request).await?;

		Ok(())
	}
}
