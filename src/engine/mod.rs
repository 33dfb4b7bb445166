pub mod bundle;
pub mod codec;
pub mod collection;
pub mod guard;
pub mod math;
pub mod mutation;
pub mod observe;
pub mod path;
pub mod persistence;
pub mod query;
pub mod value;
pub mod vault;

pub use bundle::ExportBundle;
pub use codec::JsonCodec;
pub use collection::Collection;
pub use math::MathOp;
pub use observe::Observed;
pub use path::Path;
pub use persistence::Persistence;
pub use query::Criteria;
pub use value::Kind;
pub use vault::VaultCodec;
