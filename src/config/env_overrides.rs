use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REVERIE_BACKEND_URL")
            && !url.is_empty()
        {
            self.backend.url = url;
        }

        if let Ok(key) = std::env::var("REVERIE_ANON_KEY")
            && !key.is_empty()
        {
            self.backend.anon_key = Some(key);
        }

        if let Ok(token) = std::env::var("REVERIE_ACCESS_TOKEN")
            && !token.is_empty()
        {
            self.backend.access_token = Some(token);
        }

        if let Ok(user_id) = std::env::var("REVERIE_USER_ID")
            && !user_id.is_empty()
        {
            self.backend.user_id = Some(user_id);
        }
    }
}
