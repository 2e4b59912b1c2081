//! Identity of a profiled unit of code.

use std::fmt;

/// Identifies a profiled callable site.
///
/// Code locations are the aggregation key of the [`StatTree`][crate::StatTree]: two
/// locations are equal if and only if every field is equal. Use the [`location!`][crate::location]
/// macro to create one for the surrounding code.
///
/// # Examples
///
/// ```
/// use callgauge::location;
///
/// let here = location!("parse_header");
/// assert_eq!(here.function(), "parse_header");
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CodeLocation {
    module: &'static str,
    function: &'static str,
    file: &'static str,
    line: u32,
}

impl CodeLocation {
    /// Creates a code location from its parts.
    ///
    /// Prefer the [`location!`][crate::location] macro, which fills in the module,
    /// file and line automatically.
    #[must_use]
    pub const fn new(
        module: &'static str,
        function: &'static str,
        file: &'static str,
        line: u32,
    ) -> Self {
        Self {
            module,
            function,
            file,
            line,
        }
    }

    /// The module path the location was declared in.
    #[must_use]
    pub const fn module(&self) -> &'static str {
        self.module
    }

    /// The function name, used when searching a stat tree by name.
    #[must_use]
    pub const fn function(&self) -> &'static str {
        self.function
    }

    /// The source file the location was declared in.
    #[must_use]
    pub const fn file(&self) -> &'static str {
        self.file
    }

    /// The source line the location was declared on.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{} ({}:{})",
            self.module, self.function, self.file, self.line
        )
    }
}

/// Creates a [`CodeLocation`] for the given function name at the point of invocation.
///
/// # Examples
///
/// ```
/// use callgauge::{Instrumentation, location};
///
/// fn checksum(instrumentation: &Instrumentation, data: &[u8]) -> u32 {
///     let _frame = instrumentation.enter(location!("checksum"));
///     data.iter().map(|b| u32::from(*b)).sum()
/// }
///
/// let instrumentation = Instrumentation::new();
/// assert_eq!(checksum(&instrumentation, &[1, 2, 3]), 6);
/// ```
#[macro_export]
macro_rules! location {
    ($function:expr) => {
        $crate::CodeLocation::new(::core::module_path!(), $function, ::core::file!(), ::core::line!())
    };
}
