/// Categories and countries the service ingests. These mirror what the
/// news provider supports on its headline endpoints.

#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub name: &'static str,
    pub slug: &'static str,
}

pub const CATEGORIES: &[Category] = &[
    Category { name: "General", slug: "general" },
    Category { name: "Business", slug: "business" },
    Category { name: "Technology", slug: "technology" },
    Category { name: "Science", slug: "science" },
    Category { name: "Health", slug: "health" },
    Category { name: "Sports", slug: "sports" },
    Category { name: "Entertainment", slug: "entertainment" },
];

#[derive(Debug, Clone, Copy)]
pub struct Country {
    pub code: &'static str,
    pub name: &'static str,
}

pub const COUNTRIES: &[Country] = &[
    Country { code: "us", name: "United States" },
    Country { code: "gb", name: "United Kingdom" },
    Country { code: "ca", name: "Canada" },
    Country { code: "au", name: "Australia" },
    Country { code: "in", name: "India" },
    Country { code: "de", name: "Germany" },
    Country { code: "fr", name: "France" },
    Country { code: "it", name: "Italy" },
    Country { code: "jp", name: "Japan" },
    Country { code: "kr", name: "South Korea" },
    Country { code: "cn", name: "China" },
    Country { code: "br", name: "Brazil" },
    Country { code: "mx", name: "Mexico" },
    Country { code: "za", name: "South Africa" },
    Country { code: "ae", name: "UAE" },
    Country { code: "sg", name: "Singapore" },
];

/// Full country name for search queries, falling back to the uppercased
/// code for countries not in the list.
pub fn country_name(code: &str) -> String {
    COUNTRIES
        .iter()
        .find(|c| c.code == code)
        .map(|c| c.name.to_string())
        .unwrap_or_else(|| code.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_country_resolves_to_name() {
        assert_eq!(country_name("gb"), "United Kingdom");
    }

    #[test]
    fn unknown_country_falls_back_to_code() {
        assert_eq!(country_name("xx"), "XX");
    }
}
