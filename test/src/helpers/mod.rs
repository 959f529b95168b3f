pub mod test_route;
pub mod assertions;

pub use assertions::{drain, walk_rows};
pub use test_route::TestRoute;
