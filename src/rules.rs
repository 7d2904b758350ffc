use crate::model::Category;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// One `(category, matcher)` pair. A matcher may name `class` and `msg`
/// groups to hand the extractor a better exception/message than the
/// generic fallback finds.
#[derive(Debug, Clone)]
pub struct Rule {
    pub category: Category,
    pub name: &'static str,
    pub pattern: Regex,
}

impl Rule {
    pub fn new(category: Category, name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { category, name, pattern: Regex::new(pattern)? })
    }

    pub fn captures<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        self.pattern.captures(text)
    }
}

fn rule(category: Category, name: &'static str, pattern: &str) -> Rule {
    Rule::new(category, name, pattern).unwrap()
}

// Declaration order is the tie-break: an HTTP failure inside a Spring trace
// is http, not framework, because http comes first.
static DEFAULT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            Category::HttpServer,
            "http-server",
            r"(?:(?P<class>[\w$.]*HttpServerErrorException(?:\$\w+)?):?\s*(?P<msg>[^\n]*))|HTTP(?:/\d(?:\.\d)?)?\s+5\d\d\b",
        ),
        rule(
            Category::HttpClient,
            "http-client",
            r"(?:(?P<class>[\w$.]*HttpClientErrorException(?:\$\w+)?):?\s*(?P<msg>[^\n]*))|HTTP(?:/\d(?:\.\d)?)?\s+4\d\d\b|\bFeign\w*Exception|RestClient\w*Exception|WebClient\w*Exception|\bokhttp3\.|\borg\.apache\.http\.|org\.springframework\.web\.client|org\.springframework\.cloud\.openfeign",
        ),
        rule(
            Category::Serialization,
            "serialization",
            r"com\.fasterxml\.jackson|com\.google\.gson|\borg\.json\.|javax\.xml\.bind|com\.thoughtworks\.xstream|\bJson(?:Parse|Mapping|Processing)Exception|\bJSONException|\bJAXBException|\b(?:De)?[Ss]erializationException|\bJsonSyntaxException",
        ),
        rule(
            Category::Validation,
            "validation",
            r"\b(?:MethodArgumentNotValid|ConstraintViolation|Validation|BindException|BindValidation)\w*Exception|javax\.validation|jakarta\.validation|org\.springframework\.validation",
        ),
        rule(
            Category::DependencyInjection,
            "dependency-injection",
            r"\b(?:NoSuchBeanDefinition|NoUniqueBeanDefinition|UnsatisfiedDependency|BeanCreation|BeanDefinitionStore|BeanCurrentlyInCreation|BeanInstantiation|CircularDependency)\w*Exception|org\.springframework\.beans\.factory",
        ),
        rule(
            Category::Timeout,
            "timeout",
            r"(?i)\b\w*timeoutexception\b|\btimed out\b|\bread timeout\b|\bconnect timeout\b",
        ),
        rule(
            Category::Cache,
            "cache",
            r"(?i)\bredis\w*|\behcache\b|\bhazelcast\b|\bcaffeine\b|org\.springframework\.cache|\bjedis\w*",
        ),
        rule(
            Category::Messaging,
            "messaging",
            r"(?i)org\.apache\.kafka|org\.springframework\.(?:amqp|kafka|jms)|\bkafka\w*exception|\brabbitmq\b|\bamqp\w*exception|\bactivemq\b|\brocketmq\b|\bpulsar\w*exception",
        ),
        rule(
            Category::Database,
            "database",
            r"com\.mysql|org\.postgresql|oracle\.jdbc|com\.microsoft\.sqlserver|org\.hibernate|org\.springframework\.(?:orm|jdbc|dao|data\.jpa)|(?:javax|jakarta)\.persistence|\bjava\.sql\.|\b\w*SQL\w*Exception|\bJDBC\w*|\bDataAccessException",
        ),
        rule(
            Category::Network,
            "network",
            r"\bjava\.net\.|\bConnect(?:ion)?Exception|\bSocketException|\bUnknownHostException|\bNoRouteToHostException|\bPortUnreachableException|(?i:connection (?:refused|reset))",
        ),
        rule(
            Category::Security,
            "security",
            r"\bSecurityException|\bAuthentication\w*Exception|\bAuthorization\w*Exception|\bAccessDenied\w*|\bBadCredentials\w*|org\.springframework\.security|javax\.net\.ssl|\bSSLHandshake\w*",
        ),
        rule(
            Category::Compilation,
            "compilation",
            r"\bCompilation\w*Exception|\bSyntax(?:Error|Exception)|javax\.tools\.Diagnostic|com\.sun\.tools\.javac|(?i:compilation failed)|\berror\[E\d{4}\]",
        ),
        rule(
            Category::Memory,
            "memory",
            r"\bOutOfMemoryError|\bStackOverflowError|(?i:out of memory)|GC overhead limit exceeded",
        ),
        rule(
            Category::Io,
            "io",
            r"\bFileNotFoundException|\bIOException|\bFileSystemException|\bNoSuchFileException|\bUncheckedIOException|\bEOFException|\bjava\.io\.|\bjava\.nio\.file",
        ),
        rule(
            Category::Concurrency,
            "concurrency",
            r"\bConcurrentModificationException|\bIllegalMonitorStateException|(?i:\bdeadlock)|\bRejectedExecutionException|\bInterruptedException|\bBrokenBarrierException",
        ),
        rule(
            Category::Configuration,
            "configuration",
            r"\b\w*Configuration\w*Exception|Could not resolve placeholder|\bInvalidConfigurationPropertyValueException",
        ),
        rule(
            Category::Framework,
            "framework",
            r"org\.springframework|(?i:spring boot)|APPLICATION FAILED TO START",
        ),
    ]
});

pub fn default_rules() -> Vec<Rule> {
    DEFAULT_RULES.clone()
}

/// First rule in declaration order that matches `text`.
pub fn first_match<'r, 't>(rules: &'r [Rule], text: &'t str) -> Option<(&'r Rule, Captures<'t>)> {
    rules.iter().find_map(|r| r.captures(text).map(|c| (r, c)))
}

// Category for a block only the generic "Class: message" shape recognized.
const GENERIC_KEYWORDS: &[(&str, Category)] = &[
    ("NullPointer", Category::Runtime),
    ("IllegalArgument", Category::Runtime),
    ("IllegalState", Category::Runtime),
    ("ClassCast", Category::Runtime),
    ("IndexOutOfBounds", Category::Runtime),
    ("Arithmetic", Category::Runtime),
    ("NumberFormat", Category::Runtime),
    ("UnsupportedOperation", Category::Runtime),
    ("NoSuchElement", Category::Runtime),
    ("ClassNotFound", Category::Configuration),
    ("NoClassDefFound", Category::Configuration),
    ("NoSuchMethod", Category::Configuration),
];

pub fn infer_generic_category(class: &str) -> Category {
    GENERIC_KEYWORDS
        .iter()
        .find(|(kw, _)| class.contains(kw))
        .map(|(_, c)| *c)
        .unwrap_or(Category::Unknown)
}
