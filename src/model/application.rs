//! Command-line application documentation.

use super::Text;

#[derive(Debug, Clone, Default)]
pub struct Application {
    pub name: Text,
    pub options: Vec<AppOption>,
    pub synopses: Vec<Synopsis>,
    pub commands: Vec<Command>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOption {
    pub name: Text,
    pub value: Text,
    pub description: Text,
    /// `OPTION_FLAG_MULTIPLE` / `OPTION_FLAG_REQUIRED`.
    pub flags: u32,
    /// Sequential within the application, starting at 0.
    pub id: u32,
}

/// A usage line: a comma separated list of option names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synopsis {
    pub name: Text,
    pub items: Text,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub name: Text,
    pub parameters: Text,
    pub description: Text,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: Text,
    pub data: Text,
    pub sub_sections: Vec<Section>,
}

impl Application {
    pub fn new(name: &str) -> Self {
        Self {
            name: Text::new(name),
            ..Self::default()
        }
    }

    /// Add an option numbered after the last one.
    pub fn add_option(&mut self, name: Text, flags: u32) -> usize {
        let id = self.options.last().map_or(0, |last| last.id + 1);
        self.options.push(AppOption {
            name,
            flags,
            id,
            ..AppOption::default()
        });
        self.options.len() - 1
    }

    pub fn new_section(&mut self, name: Text) {
        self.sections.push(Section {
            name,
            ..Section::default()
        });
    }

    /// Start a sub-section under the last section. Returns `false` when
    /// there is no section yet.
    pub fn new_sub_section(&mut self, name: Text) -> bool {
        match self.sections.last_mut() {
            Some(section) => {
                section.sub_sections.push(Section {
                    name,
                    ..Section::default()
                });
                true
            }
            None => false,
        }
    }

    /// Append text to the innermost open section.
    pub fn extend_section(&mut self, text: &Text) -> bool {
        let Some(section) = self.sections.last_mut() else {
            return false;
        };

        let target = match section.sub_sections.last_mut() {
            Some(sub_section) => sub_section,
            None => section,
        };
        if !text.is_empty() {
            target.data.append(&text.text, text.fixed);
        }
        true
    }

    /// Option ids for the names listed in a synopsis. Names are separated by
    /// commas; surrounding spaces and control characters are trimmed. Names
    /// with no matching option are returned separately.
    pub fn resolve_synopsis(&self, items: &str, limit: usize) -> (Vec<u8>, Vec<String>) {
        let mut ids = Vec::new();
        let mut missing = Vec::new();

        for item in items.split(',') {
            if ids.len() == limit {
                break;
            }

            let name = item.trim_matches(|c: char| c == ' ' || (c as u32) < 0x0f);
            match self.options.iter().find(|option| option.name.text == name) {
                Some(option) => ids.push(option.id as u8),
                None => missing.push(name.to_string()),
            }
        }

        (ids, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_options(names: &[&str]) -> Application {
        let mut application = Application::new("tool");
        for name in names {
            application.add_option(Text::new(*name), 0);
        }
        application
    }

    #[test]
    fn test_option_ids_are_sequential() {
        let application = with_options(&["-o", "-v", "-q"]);
        let ids: Vec<u32> = application.options.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_synopsis_resolution() {
        let application = with_options(&["-o", "-v", "input"]);
        let (ids, missing) = application.resolve_synopsis(" input ,-o,\t-x , -v", 255);
        assert_eq!(ids, vec![2, 0, 1]);
        assert_eq!(missing, vec!["-x".to_string()]);
    }

    #[test]
    fn test_synopsis_limit() {
        let application = with_options(&["a"]);
        let (ids, _) = application.resolve_synopsis("a,a,a,a", 3);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_sections_extend_innermost() {
        let mut application = Application::new("tool");
        assert!(!application.extend_section(&Text::new("lost")));

        application.new_section(Text::new("DESCRIPTION"));
        application.extend_section(&Text::new("first"));
        application.extend_section(&Text::new("line"));
        assert!(application.new_sub_section(Text::new("Details")));
        application.extend_section(&Text::new("nested"));

        let section = &application.sections[0];
        assert_eq!(section.data.text, "first line");
        assert_eq!(section.sub_sections[0].data.text, "nested");
    }
}
