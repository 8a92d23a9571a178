pub struct Icons;

impl Icons {
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const DATABASE: &str = "🗄️";
    pub const WRENCH: &str = "🔧";
    pub const MAG: &str = "🔎";
    pub const DEL: &str = "🗑️";
    pub const NEW: &str = "✨";
}
