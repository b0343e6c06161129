use crate::router::Router;

pub struct ServerContext {
    pub router: Router,
}

impl ServerContext {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}
