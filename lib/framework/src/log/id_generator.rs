use uuid::Uuid;

// time ordered, shorter than hyphenated uuid in log console
pub fn random_id() -> String {
    bs58::encode(Uuid::now_v7().as_bytes()).into_string()
}
