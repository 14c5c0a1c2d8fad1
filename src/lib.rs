pub mod core {
    pub mod board;
    pub mod config;
    pub mod error;
    pub mod startup;
    pub mod tracing_init;
}

pub mod models {
    pub mod card;
    pub mod machine;
    pub mod user;
}

pub mod api {
    pub mod backend;
    pub mod client;
    pub mod messages;
    pub mod mock;
}

pub mod auth {
    pub mod resolver;
}

pub mod machine {
    pub mod controller;
    pub mod relay;
}

pub mod persist {
    pub mod snapshot;
}

pub mod rfid {
    pub mod line_reader;
    pub mod reader;
}

pub mod stores {
    pub mod user_cache;
}

pub mod utils {
    pub mod time;
}
