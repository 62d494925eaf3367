use crate::core::config::data::{
    Config, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.base_url {
            Some(url) => println!("  base-url: {url}"),
            None => println!("  base-url: (unset, default: {DEFAULT_BASE_URL})"),
        }
        match &self.default_model {
            Some(model) => println!("  default-model: {model}"),
            None => println!("  default-model: (unset)"),
        }
        match self.request_timeout_secs {
            Some(secs) => println!("  request-timeout: {secs}s"),
            None => println!(
                "  request-timeout: (unset, default: {DEFAULT_REQUEST_TIMEOUT_SECS}s)"
            ),
        }
        match self.stream_idle_timeout_secs {
            Some(secs) => println!("  stream-idle-timeout: {secs}s"),
            None => println!(
                "  stream-idle-timeout: (unset, default: {DEFAULT_STREAM_IDLE_TIMEOUT_SECS}s)"
            ),
        }
    }
}
