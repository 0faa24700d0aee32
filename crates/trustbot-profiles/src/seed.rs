//! Hardcoded fallback profiles, one per seed language, used when profile generation
//! is skipped or the LLM call behind it fails. These carry exactly the regex patterns,
//! skip-token lists, and per-language call-pattern guidance a human would write by hand
//! for each of these languages.

use std::collections::HashMap;

use crate::model::{BlockRuleConfig, ForwardDeclarationConfig, LanguageProfile, SpecialFileConfig};

fn delphi() -> LanguageProfile {
    LanguageProfile {
        language: "delphi".to_string(),
        aliases: vec!["pascal".to_string(), "object_pascal".to_string()],
        file_extensions: vec![".pas", ".dpr", ".dfm", ".inc"].into_iter().map(str::to_string).collect(),
        function_def_patterns: vec![
            r"^\s*(?:class[ \t]+)?(?:function|procedure)[ \t]+(?:(?P<class_prefix>\w+)\.)?(?P<name>\w+)".to_string(),
            r"^\s*(?:constructor|destructor)[ \t]+(?:(?P<class_prefix>\w+)\.)?(?P<name>\w+)".to_string(),
        ],
        named_regex_groups: HashMap::from([
            ("name".to_string(), "name".to_string()),
            ("class_prefix".to_string(), "class_prefix".to_string()),
        ]),
        forward_declaration_rules: Some(ForwardDeclarationConfig {
            keyword: "implementation".to_string(),
            strategy: "discard_before_keyword_unless_class_prefix".to_string(),
        }),
        special_file_types: vec![SpecialFileConfig {
            extension: ".dfm".to_string(),
            parser_type: "dfm_form".to_string(),
            object_pattern: r"^\s*object\s+(?P<name>\w+)\s*:\s*(?P<class>\w+)".to_string(),
            event_pattern: r"^\s*On\w+\s*=\s*(?P<handler>\w+)".to_string(),
            metadata_keys: vec!["event_handlers".to_string(), "is_dfm_form".to_string()],
        }],
        llm_call_prompt: "\
DELPHI / OBJECT PASCAL — language-specific rules:

CALL PATTERNS (report these):
- Parameterless procedure statements: `InitialiseEcran;` — no parentheses, this IS a call.
- Parameterless function used as expression or argument:
    `result := GetCheminVersLesDocuments;`
    `tpath.combine(GetCheminVersLesDocuments, 'DB')`
  The bare identifier IS a function call even without `()`.
- Procedure/function with arguments: `TraitementDeLaBase(Edit1.Text, Table);`
- Method calls on objects: `DataModule2.LoadData;` or `DataModule2.LoadData(x);`
  — if `LoadData` is in KNOWN FUNCTIONS, report it.
- `inherited` followed by a known name: `inherited Create;` — report `Create`.
- Calls inside `with` blocks still count.

NOT CALLS (do NOT report):
- `var Form1: TForm1;` — variable declaration, not a call.
- `uses Unit3, SysUtils;` — unit import, not a call.
- `TForm1 = class(TForm)` — type declaration, not a call.
- Property access that is NOT in KNOWN FUNCTIONS: `Edit1.Text`, `Sender.Tag`.
- The `T`-prefixed class name in the method header: `procedure TForm1.Button1Click` — do not report `TForm1`.
- Forward declarations in the `interface` section.
"
        .to_string(),
        skip_tokens: [
            "BEGIN", "END", "VAR", "CONST", "TYPE", "USES", "UNIT", "INTERFACE",
            "IMPLEMENTATION", "PROGRAM", "PROCEDURE", "FUNCTION", "CONSTRUCTOR",
            "DESTRUCTOR", "PROPERTY", "INHERITED", "RESULT", "NIL", "THEN", "DO",
            "OF", "TO", "DOWNTO", "REPEAT", "UNTIL", "CASE", "WITH", "TRY",
            "FINALLY", "EXCEPT", "RAISE", "EXIT", "BREAK", "CONTINUE", "IF",
            "ELSE", "FOR", "WHILE", "NOT", "AND", "OR", "IN", "IS", "AS",
            "CLASS", "RECORD", "OBJECT", "SET", "FILE", "ARRAY",
            "STRING", "INTEGER", "BOOLEAN", "TRUE", "FALSE", "SELF",
        ]
        .into_iter()
        .map(str::to_string)
        .collect(),
        supports_bare_identifiers: true,
        bare_id_negative_lookahead: r"(?!\s*\.)".to_string(),
        single_line_comment: "//".to_string(),
        multi_line_comment_open: "{".to_string(),
        multi_line_comment_close: "}".to_string(),
        string_delimiters: vec!["'".to_string()],
        ..Default::default()
    }
}

fn python() -> LanguageProfile {
    LanguageProfile {
        language: "python".to_string(),
        file_extensions: vec![".py".to_string()],
        function_def_patterns: vec![r"^(?P<indent>[ \t]*)(?:async\s+)?def\s+(?P<name>\w+)\s*\(".to_string()],
        class_def_patterns: vec![r"^(?P<indent>[ \t]*)class\s+(?P<name>\w+)".to_string()],
        llm_call_prompt: "\
PYTHON — language-specific rules:

CALL PATTERNS (report these):
- Direct calls: `foo()`, `foo(arg1, arg2)`
- Method calls if the method name is in KNOWN FUNCTIONS: `obj.process_data()`
- `super().__init__()` or `super().method()` — report `method` if in KNOWN FUNCTIONS.
- Calls used as arguments: `print(compute_value())` — report `compute_value`.
- Calls in comprehensions/generators: `[transform(x) for x in items]` — report `transform`.
- Decorator calls that invoke known functions: `@retry(max=3)` — report `retry` only if in KNOWN FUNCTIONS.

NOT CALLS (do NOT report):
- `import module` or `from module import name` — imports, not calls.
- `@decorator` without parentheses used only as decoration syntax.
- Class definitions: `class Foo(Base):` — do not report `Base`.
- Type hints: `x: List[int]` — not a call.
"
        .to_string(),
        single_line_comment: "#".to_string(),
        multi_line_comment_open: "\"\"\"".to_string(),
        multi_line_comment_close: "\"\"\"".to_string(),
        string_delimiters: vec!["\"".to_string(), "'".to_string()],
        ..Default::default()
    }
}

fn java() -> LanguageProfile {
    LanguageProfile {
        language: "java".to_string(),
        file_extensions: vec![".java".to_string()],
        function_def_patterns: vec![
            r"(?:(?:public|private|protected|static|final|abstract|synchronized)\s+)*[\w<>\[\],\s]+\s+(?P<name>\w+)\s*\([^)]*\)\s*(?:throws\s+[\w,\s]+)?\s*\{".to_string(),
        ],
        class_def_patterns: vec![r"class\s+(?P<name>\w+)".to_string()],
        llm_call_prompt: "\
JAVA — language-specific rules:

CALL PATTERNS (report these):
- Direct calls: `processData(args)`
- Static calls: `ClassName.staticMethod()` — report `staticMethod` if in KNOWN FUNCTIONS.
- Constructor: `new ClassName(args)` — report `ClassName` if in KNOWN FUNCTIONS.
- Chained calls: `obj.prepare().execute()` — report each method in KNOWN FUNCTIONS.
- `super.method()` or `this.method()` — report `method`.

NOT CALLS (do NOT report):
- `import com.example.Foo;` — import, not a call.
- Annotations: `@Override`, `@Autowired` — not calls.
- Type declarations: `List<String> items` — not a call.
- Class/interface declarations: `class Foo extends Bar` — do not report `Bar`.
"
        .to_string(),
        ..Default::default()
    }
}

fn javascript() -> LanguageProfile {
    LanguageProfile {
        language: "javascript".to_string(),
        file_extensions: vec![".js".to_string(), ".jsx".to_string()],
        function_def_patterns: vec![
            r"(?:async\s+)?function\s+(?P<name>\w+)\s*\(".to_string(),
            r"(?:const|let|var)\s+(?P<name>\w+)\s*=\s*(?:async\s+)?\(".to_string(),
            r"(?:const|let|var)\s+(?P<name>\w+)\s*=\s*(?:async\s+)?function".to_string(),
        ],
        class_def_patterns: vec![r"class\s+(?P<name>\w+)".to_string()],
        llm_call_prompt: "\
JAVASCRIPT — language-specific rules:

CALL PATTERNS (report these):
- Direct calls: `processData(args)`, `fetchItems()`
- Method calls: `obj.method()` — report `method` if in KNOWN FUNCTIONS.
- Callbacks passed by name: `array.map(transformItem)` — report `transformItem` if in KNOWN FUNCTIONS.
- IIFE patterns: `(function init() { ... })()` — report `init` if in KNOWN FUNCTIONS.
- `await asyncFunction()` — report `asyncFunction`.

NOT CALLS (do NOT report):
- `require('module')` or `import ... from 'module'` — module imports, not project calls.
- `export default function` — declaration, not a call.
- `new Promise(resolve => ...)` — built-in, not a project call.
"
        .to_string(),
        ..Default::default()
    }
}

fn typescript() -> LanguageProfile {
    LanguageProfile {
        language: "typescript".to_string(),
        file_extensions: vec![".ts".to_string(), ".tsx".to_string()],
        function_def_patterns: vec![
            r"(?:async\s+)?function\s+(?P<name>\w+)\s*[\(<]".to_string(),
            r"(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)\s*=\s*(?:async\s+)?\(".to_string(),
        ],
        class_def_patterns: vec![
            r"(?:export\s+)?class\s+(?P<name>\w+)".to_string(),
            r"(?:export\s+)?interface\s+(?P<name>\w+)".to_string(),
        ],
        llm_call_prompt: "\
TYPESCRIPT — language-specific rules:

CALL PATTERNS (report these):
- Direct calls: `processData(args)`, `fetchItems()`
- Method calls: `obj.method()` — report `method` if in KNOWN FUNCTIONS.
- Callbacks passed by name: `array.map(transformItem)` — report `transformItem` if in KNOWN FUNCTIONS.
- `await asyncFunction()` — report `asyncFunction`.
- Generic calls: `createInstance<T>(factory)` — report `createInstance`.

NOT CALLS (do NOT report):
- `import { Foo } from './module'` — import, not a call.
- Type annotations: `x: SomeType`, `as SomeType` — not calls.
- Interface/type declarations: `interface Foo extends Bar` — not a call.
- `export default function` — declaration, not a call.
"
        .to_string(),
        ..Default::default()
    }
}

fn csharp() -> LanguageProfile {
    LanguageProfile {
        language: "csharp".to_string(),
        file_extensions: vec![".cs".to_string()],
        function_def_patterns: vec![
            r"(?:(?:public|private|protected|internal|static|virtual|override|abstract|async)\s+)*[\w<>\[\]]+\s+(?P<name>\w+)\s*\(".to_string(),
        ],
        class_def_patterns: vec![r"class\s+(?P<name>\w+)".to_string()],
        llm_call_prompt: "\
C# — language-specific rules:

CALL PATTERNS (report these):
- Direct calls: `ProcessData(args)`
- Static calls: `ClassName.StaticMethod()` — report `StaticMethod` if in KNOWN FUNCTIONS.
- Constructor: `new ClassName(args)` — report `ClassName` if in KNOWN FUNCTIONS.
- `base.Method()` — report `Method`.
- Delegate invocations if the delegate name is in KNOWN FUNCTIONS.

NOT CALLS (do NOT report):
- `using System.Linq;` — import, not a call.
- Attributes: `[Serializable]`, `[HttpGet]` — not calls.
- Type declarations, inheritance: `class Foo : Bar` — not a call.
- Property declarations: `public string Name { get; set; }` — not a call.
"
        .to_string(),
        ..Default::default()
    }
}

fn go() -> LanguageProfile {
    LanguageProfile {
        language: "go".to_string(),
        file_extensions: vec![".go".to_string()],
        function_def_patterns: vec![r"func\s+(?:\(\w+\s+\*?\w+\)\s+)?(?P<name>\w+)\s*\(".to_string()],
        ..Default::default()
    }
}

fn kotlin() -> LanguageProfile {
    LanguageProfile {
        language: "kotlin".to_string(),
        file_extensions: vec![".kt".to_string()],
        function_def_patterns: vec![r"(?:suspend\s+)?fun\s+(?P<name>\w+)\s*[\(<]".to_string()],
        class_def_patterns: vec![r"class\s+(?P<name>\w+)".to_string()],
        ..Default::default()
    }
}

fn cobol() -> LanguageProfile {
    LanguageProfile {
        language: "cobol".to_string(),
        file_extensions: vec![".cbl".to_string(), ".cob".to_string()],
        function_def_patterns: vec![
            r"^\s*(?P<name>[A-Z0-9\-]+)\s+(?:SECTION|DIVISION)\.".to_string(),
            r"^\s*(?P<name>[A-Z0-9\-]+)\.\s*$".to_string(),
        ],
        llm_call_prompt: "\
COBOL — language-specific rules:

CALL PATTERNS (report these):
- `PERFORM paragraph-name` or `PERFORM section-name` — report the paragraph/section if in KNOWN FUNCTIONS.
- `PERFORM paragraph-name THRU paragraph-name-exit` — report the first paragraph.
- `CALL 'program-name'` or `CALL program-name` — report the program name if in KNOWN FUNCTIONS.
- `CALL variable USING ...` — if the variable value resolves to a known function, report it.

NOT CALLS (do NOT report):
- `COPY copybook-name` — include directive, not a call.
- `MOVE`, `ADD`, `COMPUTE` — data manipulation verbs, not calls.
- Section/paragraph headers (definitions): `MY-PARAGRAPH.` — declaration, not a call.
"
        .to_string(),
        single_line_comment: "*>".to_string(),
        multi_line_comment_open: String::new(),
        multi_line_comment_close: String::new(),
        ..Default::default()
    }
}

fn rpg() -> LanguageProfile {
    LanguageProfile {
        language: "rpg".to_string(),
        aliases: vec!["rpgle".to_string()],
        file_extensions: vec![".rpg".to_string(), ".rpgle".to_string()],
        function_def_patterns: vec![
            r"^\s*DCL-PROC\s+(?P<name>\w+)".to_string(),
            r"^\s*BEGSR\s+(?P<name>\w+)".to_string(),
        ],
        block_rules: vec![
            BlockRuleConfig {
                block_type: "procedure".to_string(),
                open_pattern: r"^\s*DCL-PROC\s+(?P<name>\w+)".to_string(),
                close_pattern: r"^\s*END-PROC\b[^;\n]*;?".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "subroutine".to_string(),
                open_pattern: r"^\s*BEGSR\s+(?P<name>\w+)".to_string(),
                close_pattern: r"^\s*ENDSR\b[^;\n]*;?".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "data_structure".to_string(),
                open_pattern: r"^\s*DCL-DS\s+(?P<name>\w+)".to_string(),
                close_pattern: r"^\s*END-DS\b[^;\n]*;?".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "interface".to_string(),
                open_pattern: r"^\s*DCL-PI\s+(?P<name>\w+|\*N)".to_string(),
                close_pattern: r"^\s*END-PI\b[^;\n]*;?".to_string(),
                name_group: "name".to_string(),
            },
        ],
        llm_call_prompt: "\
RPG / RPGLE — language-specific rules:

CALL PATTERNS (report these):
- `CALLP procedureName(args)` — report `procedureName`.
- `EXSR subroutineName` — report the subroutine if in KNOWN FUNCTIONS.
- `procedureName(args)` in free-format RPG — report `procedureName`.
- `CALL 'PROGRAMNAME'` — report if in KNOWN FUNCTIONS.

NOT CALLS (do NOT report):
- `/COPY` or `/INCLUDE` — preprocessor directives, not calls.
- `DCL-S`, `DCL-DS`, `DCL-PR` — declarations, not calls.
- `BEGSR subroutineName` — subroutine definition header, not a call.
"
        .to_string(),
        ..Default::default()
    }
}

fn natural() -> LanguageProfile {
    LanguageProfile {
        language: "natural".to_string(),
        file_extensions: vec![".nat".to_string(), String::new()],
        function_def_patterns: vec![
            r"^(?:\d+\s+)?\s*DEFINE\s+(?:SUBROUTINE|FUNCTION)\s+(?P<name>\w[\w\-]*)".to_string(),
            r"^1NEXT\s+L\s+(?P<name>\w[\w\-]*)".to_string(),
        ],
        block_rules: vec![
            BlockRuleConfig {
                block_type: "subroutine".to_string(),
                open_pattern: r"^(?:\d+\s+)?\s*DEFINE\s+SUBROUTINE\s+(?P<name>\w[\w\-]*)".to_string(),
                close_pattern: r"^(?:\d+\s+)?\s*END-SUBROUTINE\b".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "function".to_string(),
                open_pattern: r"^(?:\d+\s+)?\s*DEFINE\s+FUNCTION\s+(?P<name>\w[\w\-]*)".to_string(),
                close_pattern: r"^(?:\d+\s+)?\s*END-FUNCTION\b".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "class".to_string(),
                open_pattern: r"^(?:\d+\s+)?\s*DEFINE\s+CLASS\s+(?P<name>\w[\w\-]*)".to_string(),
                close_pattern: r"^(?:\d+\s+)?\s*END-CLASS\b".to_string(),
                name_group: "name".to_string(),
            },
        ],
        llm_call_prompt: "\
NATURAL / ADABAS language specifics:

CALL PATTERNS (report these):
- `FETCH 'ProgramName'` or `FETCH 'ProgramName' parameters` — inter-program call.
- `FETCH RETURN 'ProgramName'` — call with return to caller.
- `CALLNAT 'SubprogramName' parameters` — call to a Natural subprogram.
- `PERFORM SubroutineName` — call to a local subroutine (DEFINE SUBROUTINE).

NOT CALLS (do NOT report):
- `INPUT USING MAP 'MapName'` — screen layout reference, NOT a program call.
- `#VARIABLE = 'ProgramName'` — data assignment, NOT a call, even if the string
  value matches a known program name.
- `DEFINE DATA`, `END-DEFINE`, `MOVE`, `ASSIGN`, `RESET`, `IF`, `FOR`, `READ`,
  `HISTOGRAM`, `FIND`, `LOOP`, `END-READ`, `ESCAPE`, `WRITE`, `REDEFINE`,
  `COMPRESS`, `FORMAT`, `SET KEY`, `EJECT`, `SKIP`, `DIVIDE` — statements, not calls.
- The program's own name on the header line (`1NEXT L  ProgramName`) is NOT a call.
- Program names in FETCH/CALLNAT are enclosed in single quotes.
"
        .to_string(),
        skip_tokens: [
            "DEFINE", "END-DEFINE", "MOVE", "ASSIGN", "RESET", "IF", "THEN",
            "ELSE", "FOR", "END-FOR", "READ", "END-READ", "HISTOGRAM", "FIND",
            "LOOP", "ESCAPE", "WRITE", "INPUT", "REDEFINE", "COMPRESS", "FORMAT",
            "SET", "EJECT", "SKIP", "DIVIDE", "DO", "DOEND", "END", "END-IF",
            "IGNORE", "MARK", "SOUND", "ALARM", "CONST", "VIEW",
        ]
        .into_iter()
        .map(str::to_string)
        .collect(),
        supports_bare_identifiers: true,
        call_keyword_patterns: vec![
            r"(?:FETCH|FETCH\s+RETURN)\s+'(?P<callee>\w+)'".to_string(),
            r"CALLNAT\s+'(?P<callee>\w+)'".to_string(),
            r"PERFORM\s+(?P<callee>\w[\w\-]*)".to_string(),
        ],
        single_line_comment: "/*".to_string(),
        multi_line_comment_open: "/*".to_string(),
        multi_line_comment_close: "*/".to_string(),
        string_delimiters: vec!["'".to_string()],
        ..Default::default()
    }
}

fn focus() -> LanguageProfile {
    LanguageProfile {
        language: "focus".to_string(),
        file_extensions: vec![".foc".to_string()],
        function_def_patterns: vec![r"^-\s*DEFINE\s+(?:FUNCTION|FILE)\s+(?P<name>\w+)".to_string()],
        block_rules: vec![
            BlockRuleConfig {
                block_type: "procedure".to_string(),
                open_pattern: r"^-\s*DEFINE\s+(?:FUNCTION|FILE)\s+(?P<name>\w+)".to_string(),
                close_pattern: r"^-\s*END\b".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "table_request".to_string(),
                open_pattern: r"^\s*TABLE\s+FILE\s+(?P<name>\w+)".to_string(),
                close_pattern: r"^\s*END\b".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "graph".to_string(),
                open_pattern: r"^\s*GRAPH\s+FILE\s+(?P<name>\w+)".to_string(),
                close_pattern: r"^\s*END\b".to_string(),
                name_group: "name".to_string(),
            },
            BlockRuleConfig {
                block_type: "if_block".to_string(),
                open_pattern: r"^-\s*IF\s+(?P<name>.+)".to_string(),
                close_pattern: r"^-\s*ENDIF\b".to_string(),
                name_group: "name".to_string(),
            },
        ],
        ..Default::default()
    }
}

/// Returns the hardcoded profile for `language`, or `None` if it isn't a seed language.
/// Language names are matched case-insensitively; `pascal`/`rpgle` resolve to the same
/// profile as `delphi`/`rpg`.
pub fn seed_profile(language: &str) -> Option<LanguageProfile> {
    match language.to_ascii_lowercase().as_str() {
        "delphi" | "pascal" | "object_pascal" => Some(delphi()),
        "python" => Some(python()),
        "java" => Some(java()),
        "javascript" => Some(javascript()),
        "typescript" => Some(typescript()),
        "csharp" => Some(csharp()),
        "go" => Some(go()),
        "kotlin" => Some(kotlin()),
        "cobol" => Some(cobol()),
        "rpg" | "rpgle" => Some(rpg()),
        "natural" => Some(natural()),
        "focus" => Some(focus()),
        _ => None,
    }
}

/// Every seed profile, keyed by canonical (non-alias) language name.
pub fn all_seed_profiles() -> HashMap<String, LanguageProfile> {
    let mut map = HashMap::new();
    for lang in [
        "delphi", "python", "java", "javascript", "typescript", "csharp", "go", "kotlin",
        "cobol", "rpg", "natural", "focus",
    ] {
        if let Some(profile) = seed_profile(lang) {
            map.insert(lang.to_string(), profile);
        }
    }
    map
}

/// Extension → canonical language name, used for the fast path of language detection
/// before falling back to content-keyword sniffing for extensionless files.
pub fn extension_map() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        (".pas", "delphi"),
        (".dpr", "delphi"),
        (".dfm", "delphi"),
        (".inc", "delphi"),
        (".py", "python"),
        (".java", "java"),
        (".js", "javascript"),
        (".jsx", "javascript"),
        (".ts", "typescript"),
        (".tsx", "typescript"),
        (".cs", "csharp"),
        (".go", "go"),
        (".kt", "kotlin"),
        (".cbl", "cobol"),
        (".cob", "cobol"),
        (".rpg", "rpg"),
        (".rpgle", "rpg"),
        (".nat", "natural"),
        (".foc", "focus"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliases_to_canonical_profile() {
        let pascal = seed_profile("pascal").unwrap();
        let delphi = seed_profile("delphi").unwrap();
        assert_eq!(pascal.language, delphi.language);
        assert_eq!(pascal.function_def_patterns, delphi.function_def_patterns);
    }

    #[test]
    fn unknown_language_returns_none() {
        assert!(seed_profile("brainfuck").is_none());
    }

    #[test]
    fn natural_profile_supports_bare_identifiers() {
        let natural = seed_profile("natural").unwrap();
        assert!(natural.supports_bare_identifiers);
        assert!(!natural.call_keyword_patterns.is_empty());
    }

    #[test]
    fn all_seed_profiles_have_nonempty_function_patterns_or_block_rules() {
        for (lang, profile) in all_seed_profiles() {
            assert!(
                !profile.function_def_patterns.is_empty() || !profile.block_rules.is_empty(),
                "profile for {lang} has neither function patterns nor block rules",
            );
        }
    }
}
