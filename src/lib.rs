pub mod schema {
    pub mod tile {
        pub mod coord;
        pub mod error;
        pub mod record;
    }
    pub mod pyramid {
        pub mod config;
        pub mod error;
    }
}
pub mod core {
    pub mod identifier;
}
pub mod interface {
    pub mod service;
    pub mod session;
    pub mod storage;
}
pub mod implement {
    pub mod service {
        pub mod notifier;
    }
    pub mod storage {
        pub mod file_system;
        pub mod sqlite;
        pub mod state;
    }
}
pub mod use_case {
    pub mod composite;
    pub mod import;
    pub mod reconcile;
    pub mod wavefront;
}
pub mod service {
    pub mod scheduler;
}


#[cfg(test)]
#[ctor::ctor]
fn initialise_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
