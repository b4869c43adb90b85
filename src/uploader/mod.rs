// Upload driver - walks the claims portal's upload form in a real browser
//
// The sequence itself lives in `driver`; `browser` is the seam between the
// sequence and the browser engine, `chromium` the production engine.

pub mod browser;
pub mod chromium;
pub mod driver;
pub mod progress_tracker;

pub use browser::{BrowserLauncher, BrowserSession, Locator};
pub use chromium::ChromiumLauncher;
pub use driver::{DriverSettings, UploadDriver};
pub use progress_tracker::UploadReport;
