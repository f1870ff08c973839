//! Worker de prueba: sirve los endpoints de un worker real con respuestas
//! fijas. Sirve para correr el master localmente y para sus tests HTTP.

mod handlers;
mod state;

pub use handlers::build_router;
pub use state::{StubConfig, StubJob, StubKind, StubState};
